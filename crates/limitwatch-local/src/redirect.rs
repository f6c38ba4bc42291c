use limitwatch_core::{Error, Navigator, Query, Result};
use std::sync::{Arc, Mutex};

use crate::query::QUERY_PARAM;

/// Fixed fallback search endpoint.
pub const FALLBACK_ENDPOINT: &str = "https://search.brave.com/search";

/// Build the fallback search URL for `query` against `endpoint`.
///
/// The endpoint's existing query string, if any, is replaced wholesale: the
/// outbound navigation carries exactly one parameter.
pub fn fallback_url(endpoint: &str, query: &Query) -> Result<url::Url> {
    let mut url = url::Url::parse(endpoint).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    url.query_pairs_mut()
        .clear()
        .append_pair(QUERY_PARAM, query.as_str());
    Ok(url)
}

/// Opens the fallback URL in the platform's default browser.
///
/// Replace-history semantics live in the hosting navigation layer; from a
/// separate process, handing the target to the default browser is the
/// closest available equivalent.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenNavigator;

impl Navigator for OpenNavigator {
    fn replace(&self, target: &url::Url) -> Result<()> {
        open::that(target.as_str()).map_err(|e| Error::Navigate(e.to_string()))
    }
}

/// Records navigation targets instead of performing them (dry runs, tests).
#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    targets: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    pub fn targets(&self) -> Vec<String> {
        self.targets
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }
}

impl Navigator for RecordingNavigator {
    fn replace(&self, target: &url::Url) -> Result<()> {
        let mut targets = self
            .targets
            .lock()
            .map_err(|_| Error::Navigate("recorder poisoned".to_string()))?;
        targets.push(target.to_string());
        Ok(())
    }
}

/// Always fails; exercises the degraded-navigation path in tests.
#[cfg(test)]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FailingNavigator;

#[cfg(test)]
impl Navigator for FailingNavigator {
    fn replace(&self, _target: &url::Url) -> Result<()> {
        Err(Error::Navigate("host refused".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_spaces_as_plus() {
        let q = Query::new("rust programming").unwrap();
        let url = fallback_url(FALLBACK_ENDPOINT, &q).unwrap();
        assert_eq!(
            url.as_str(),
            "https://search.brave.com/search?q=rust+programming"
        );
    }

    #[test]
    fn replaces_any_existing_endpoint_query() {
        let q = Query::new("rust").unwrap();
        let url = fallback_url("https://search.brave.com/search?source=web", &q).unwrap();
        assert_eq!(url.as_str(), "https://search.brave.com/search?q=rust");
    }

    #[test]
    fn rejects_unparseable_endpoint() {
        let q = Query::new("rust").unwrap();
        assert!(fallback_url("not an endpoint", &q).is_err());
    }

    #[test]
    fn recording_navigator_captures_targets_in_order() {
        let nav = RecordingNavigator::default();
        let a = fallback_url(FALLBACK_ENDPOINT, &Query::new("one").unwrap()).unwrap();
        let b = fallback_url(FALLBACK_ENDPOINT, &Query::new("two").unwrap()).unwrap();
        nav.replace(&a).unwrap();
        nav.replace(&b).unwrap();
        assert_eq!(
            nav.targets(),
            vec![
                "https://search.brave.com/search?q=one".to_string(),
                "https://search.brave.com/search?q=two".to_string(),
            ]
        );
    }
}

use limitwatch_core::Query;

/// Origin the watcher is deployed against. Hosts scope injection to this
/// origin; the functions below only look at path and query.
pub const TARGET_ORIGIN: &str = "https://kagi.com";

/// Query parameter carrying the search text on the provider's results URL.
pub const QUERY_PARAM: &str = "q";

/// Derive the search query from a page URL, if present.
///
/// Malformed URLs and missing/blank parameters are expected conditions and
/// yield `None`, never an error.
pub fn extract_query(page_url: &str) -> Option<Query> {
    let url = url::Url::parse(page_url).ok()?;
    let raw = url
        .query_pairs()
        .find(|(k, _)| k == QUERY_PARAM)
        .map(|(_, v)| v.into_owned())?;
    Query::new(&raw)
}

/// True for an ordinary results page: site-root path plus a usable query.
///
/// The limit notice is presented in-place on what looks like a results page,
/// so this keeps account pages and other site sections out of the store.
pub fn is_search_results_page(page_url: &str) -> bool {
    let Ok(url) = url::Url::parse(page_url) else {
        return false;
    };
    matches!(url.path(), "" | "/") && extract_query(page_url).is_some()
}

use limitwatch_core::{
    AddedNode, Navigator, NodeKind, PageEvent, Query, QueryStore, TriggerSource, WatchOutcome,
    WatchState,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::detect;
use crate::query::{extract_query, is_search_results_page};
use crate::redirect;

/// One watch session: the page URL under observation, the per-origin query
/// store, and the navigator that performs the (at most one) redirect.
///
/// State machine: `Watching -> Triggered`, terminal. Both detection triggers
/// (content-loaded and mutation batches) converge on [`WatchState::Triggered`];
/// the transition itself is the de-duplication mechanism, so the navigator
/// fires at most once per session.
pub struct WatchController<S, N> {
    page_url: String,
    fallback_endpoint: String,
    store: S,
    navigator: N,
    state: WatchState,
}

impl<S: QueryStore, N: Navigator> WatchController<S, N> {
    pub fn new(page_url: impl Into<String>, store: S, navigator: N) -> Self {
        Self {
            page_url: page_url.into(),
            fallback_endpoint: redirect::FALLBACK_ENDPOINT.to_string(),
            store,
            navigator,
            state: WatchState::Watching,
        }
    }

    pub fn with_fallback_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.fallback_endpoint = endpoint.into();
        self
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Page-load start step: persist the current query when the page
    /// classifies as an ordinary results page.
    ///
    /// Independent of detection; never transitions state. Store failures are
    /// advisory and swallowed.
    pub fn observe_navigation(&self) {
        if !is_search_results_page(&self.page_url) {
            return;
        }
        if let Some(q) = extract_query(&self.page_url) {
            if let Err(e) = self.store.save(&q) {
                debug!(error = %e, "query save failed");
            }
        }
    }

    /// One-shot detection over the whole document at the content-loaded
    /// milestone. Returns the session outcome when this call triggers.
    pub fn on_content_loaded(&mut self, html: &str) -> Option<WatchOutcome> {
        if self.state == WatchState::Triggered {
            return None;
        }
        if detect::document_looks_like_limit_page(html) {
            return Some(self.trigger(TriggerSource::ContentLoaded));
        }
        None
    }

    /// Mutation-batch detection: element nodes only, first match wins.
    pub fn on_nodes_added(&mut self, nodes: &[AddedNode]) -> Option<WatchOutcome> {
        if self.state == WatchState::Triggered {
            return None;
        }
        for node in nodes {
            if node.kind != NodeKind::Element {
                continue;
            }
            if detect::fragment_looks_like_limit_page(&node.html) {
                return Some(self.trigger(TriggerSource::Mutation));
            }
        }
        None
    }

    /// Freshest available query: current URL first, stored value second.
    fn resolve_query(&self) -> Option<Query> {
        extract_query(&self.page_url).or_else(|| self.store.load().ok().flatten())
    }

    fn trigger(&mut self, source: TriggerSource) -> WatchOutcome {
        self.state = WatchState::Triggered;

        let Some(query) = self.resolve_query() else {
            // No query anywhere: skip the redirect, leave the page as-is.
            debug!("limit page detected but no query is resolvable");
            return WatchOutcome {
                state: self.state,
                trigger: Some(source),
                target: None,
                navigated: false,
            };
        };

        match redirect::fallback_url(&self.fallback_endpoint, &query) {
            Ok(target) => {
                let navigated = match self.navigator.replace(&target) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, target = %target, "fallback navigation failed");
                        false
                    }
                };
                WatchOutcome {
                    state: self.state,
                    trigger: Some(source),
                    target: Some(target.into()),
                    navigated,
                }
            }
            Err(e) => {
                warn!(error = %e, "fallback url construction failed");
                WatchOutcome {
                    state: self.state,
                    trigger: Some(source),
                    target: None,
                    navigated: false,
                }
            }
        }
    }

    /// Terminal report for a session whose event source closed (page unload)
    /// before any detection.
    pub fn into_outcome(self) -> WatchOutcome {
        WatchOutcome {
            state: self.state,
            trigger: None,
            target: None,
            navigated: false,
        }
    }
}

/// Drive a session: run the start step, then drain `events` until the first
/// detection or channel close.
///
/// Returning on the first trigger drops the receiver, which is the
/// "disconnect the observer" action: no further batches are examined. There
/// is no timeout; an idle session stays in `Watching` until the sender side
/// goes away.
pub async fn run<S: QueryStore, N: Navigator>(
    mut controller: WatchController<S, N>,
    mut events: mpsc::Receiver<PageEvent>,
) -> WatchOutcome {
    controller.observe_navigation();
    while let Some(event) = events.recv().await {
        let outcome = match event {
            PageEvent::ContentLoaded { html } => controller.on_content_loaded(&html),
            PageEvent::NodesAdded { nodes } => controller.on_nodes_added(&nodes),
        };
        if let Some(outcome) = outcome {
            return outcome;
        }
    }
    controller.into_outcome()
}

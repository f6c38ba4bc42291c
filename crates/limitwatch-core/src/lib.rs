use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("navigation failed: {0}")]
    Navigate(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A user's search text: non-empty and trimmed, by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(String);

impl Query {
    /// Trims `raw`; returns `None` for empty/whitespace-only input.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Node type of a structural-mutation addition.
///
/// Only `Element` nodes are worth parsing; the watch skips the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Element,
    Text,
    Comment,
}

/// One node appended somewhere in the observed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddedNode {
    pub kind: NodeKind,
    /// Serialized markup of the node (outer form for elements).
    pub html: String,
}

impl AddedNode {
    pub fn element(html: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Element,
            html: html.into(),
        }
    }

    pub fn text(html: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Text,
            html: html.into(),
        }
    }
}

/// An event dispatched by the hosting environment during one page load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PageEvent {
    /// The document reached its "content loaded" milestone; `html` is the
    /// full document markup at that instant.
    ContentLoaded { html: String },
    /// One structural-mutation batch of appended nodes.
    NodesAdded { nodes: Vec<AddedNode> },
}

/// Watch session state. `Triggered` is terminal: there is no way back to
/// `Watching` within a single page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchState {
    Watching,
    Triggered,
}

/// Which detection path fired first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    ContentLoaded,
    Mutation,
}

/// Final report of one watch session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchOutcome {
    pub state: WatchState,
    pub trigger: Option<TriggerSource>,
    /// Fallback URL the session resolved to, if any.
    pub target: Option<String>,
    /// Whether the navigator actually performed the navigation.
    pub navigated: bool,
}

/// Durable per-origin slot for the last observed query.
///
/// Implementations are best-effort caches, not correctness-critical paths:
/// callers degrade every failure to "no value".
pub trait QueryStore: Send + Sync {
    fn save(&self, query: &Query) -> Result<()>;
    fn load(&self) -> Result<Option<Query>>;
}

/// Performs the outbound navigation to the fallback provider.
///
/// `replace` must substitute the current history entry rather than push a
/// new one, so the limit page is not retained in back-navigation history.
/// At-most-once invocation per page load is the caller's responsibility
/// (the watch state machine enforces it).
pub trait Navigator: Send + Sync {
    fn replace(&self, target: &url::Url) -> Result<()>;
}

impl<T: Navigator + ?Sized> Navigator for Box<T> {
    fn replace(&self, target: &url::Url) -> Result<()> {
        (**self).replace(target)
    }
}

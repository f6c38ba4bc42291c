use limitwatch_core::{Error, Query, QueryStore, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub mod detect;
pub mod fetch;
pub mod query;
pub mod redirect;
pub mod watch;

/// Fixed identifier of the persisted-last-query slot.
pub const STORAGE_KEY: &str = "kagi_last_query";

/// Per-origin single-slot query store on the local filesystem.
///
/// Notes:
/// - One slot per origin, last-write-wins across processes; no locking. The
///   value is advisory (a fallback hint), so lost races are acceptable.
/// - The value is the raw trimmed query text, no further encoding.
#[derive(Debug, Clone)]
pub struct FsQueryStore {
    root: PathBuf,
    origin: String,
}

impl FsQueryStore {
    pub fn new(root: PathBuf, origin: impl Into<String>) -> Self {
        Self {
            root,
            origin: origin.into(),
        }
    }

    /// Origin serialization for a page URL, e.g. `https://kagi.com`.
    ///
    /// Unparseable input falls back to the raw trimmed string so the slot
    /// still keys stably.
    pub fn origin_for(page_url: &str) -> String {
        url::Url::parse(page_url)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|_| page_url.trim().to_string())
    }

    fn key(&self) -> String {
        // Deterministic key: origin + slot identifier.
        let mut h = Sha256::new();
        h.update(b"origin:");
        h.update(self.origin.as_bytes());
        h.update(b"\nslot:");
        h.update(STORAGE_KEY.as_bytes());
        hex::encode(h.finalize())
    }

    fn slot_path(&self) -> PathBuf {
        let key = self.key();
        self.root
            .join(&key[0..2])
            .join(&key[2..4])
            .join(format!("{key}.txt"))
    }
}

impl QueryStore for FsQueryStore {
    fn save(&self, query: &Query) -> Result<()> {
        let p = self.slot_path();
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Store(e.to_string()))?;
        }
        fs::write(&p, query.as_str()).map_err(|e| Error::Store(e.to_string()))
    }

    fn load(&self) -> Result<Option<Query>> {
        let p = self.slot_path();
        if !p.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&p).map_err(|e| Error::Store(e.to_string()))?;
        // A blank slot counts as unset.
        Ok(Query::new(&raw))
    }
}

/// In-process store: the single-slot analogue of page-local storage.
///
/// Used by tests and by embedders that supply their own durable layer.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueryStore {
    slot: Arc<Mutex<Option<Query>>>,
}

impl QueryStore for MemoryQueryStore {
    fn save(&self, query: &Query) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| Error::Store("slot poisoned".to_string()))?;
        *slot = Some(query.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<Query>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| Error::Store("slot poisoned".to_string()))?;
        Ok(slot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fs_store_round_trips_and_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsQueryStore::new(tmp.path().to_path_buf(), "https://kagi.com");

        assert!(store.load().unwrap().is_none());

        let q1 = Query::new("rust").unwrap();
        store.save(&q1).unwrap();
        assert_eq!(store.load().unwrap(), Some(q1));

        // Last write wins.
        let q2 = Query::new("rust programming").unwrap();
        store.save(&q2).unwrap();
        assert_eq!(store.load().unwrap(), Some(q2));
    }

    #[test]
    fn fs_store_slots_are_per_origin() {
        let tmp = tempfile::tempdir().unwrap();
        let a = FsQueryStore::new(tmp.path().to_path_buf(), "https://kagi.com");
        let b = FsQueryStore::new(tmp.path().to_path_buf(), "https://example.com");

        a.save(&Query::new("rust").unwrap()).unwrap();
        assert!(b.load().unwrap().is_none());
        assert_eq!(a.load().unwrap().unwrap().as_str(), "rust");
    }

    #[test]
    fn fs_store_treats_blank_slot_as_unset() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsQueryStore::new(tmp.path().to_path_buf(), "https://kagi.com");

        // Simulate a damaged slot written by something else.
        let p = store.slot_path();
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(&p, "   \n").unwrap();

        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn origin_for_normalizes_and_degrades() {
        assert_eq!(
            FsQueryStore::origin_for("https://kagi.com/?q=rust"),
            "https://kagi.com"
        );
        assert_eq!(FsQueryStore::origin_for("not a url"), "not a url");
    }

    proptest! {
        #[test]
        fn fs_store_round_trips_any_valid_query(raw in "\\PC{1,80}") {
            let Some(q) = Query::new(&raw) else {
                // Whitespace-only inputs have nothing to store.
                return Ok(());
            };
            let tmp = tempfile::tempdir().unwrap();
            let store = FsQueryStore::new(tmp.path().to_path_buf(), "https://kagi.com");
            store.save(&q).unwrap();
            prop_assert_eq!(store.load().unwrap(), Some(q));
        }
    }
}

//! Last-synced content per path.
//!
//! Both directions record the hash of what they transferred. A local change
//! whose bytes hash to the recorded value is the watcher reporting a write
//! the engine made itself, and a remote update with the recorded hash is
//! already on disk.

use devsync_util::hash::content_hash;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SyncLedger {
    hashes: HashMap<String, String>,
}

impl SyncLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `bytes` as the synced content of `path`.
    pub fn record(&mut self, path: &str, bytes: &[u8]) {
        self.hashes.insert(path.to_string(), content_hash(bytes));
    }

    /// Whether `bytes` equals the last synced content of `path`.
    #[must_use]
    pub fn matches(&self, path: &str, bytes: &[u8]) -> bool {
        self.hashes
            .get(path)
            .is_some_and(|hash| *hash == content_hash(bytes))
    }

    /// Whether `path` was ever synced.
    #[must_use]
    pub fn knows(&self, path: &str) -> bool {
        self.hashes.contains_key(path)
    }

    pub fn forget(&mut self, path: &str) {
        self.hashes.remove(path);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

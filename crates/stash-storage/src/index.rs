//! Side index mapping identifiers to their extension.
//!
//! The index lets `get`/`delete` address an object directly instead of
//! listing the bucket. It is a bounded cache of what the backend holds: every
//! write and delete updates it, a miss falls back to prefix listing, an entry
//! pointing at a vanished object is evicted on first use, and a full bucket
//! listing prunes entries for objects removed by other processes. No lock is
//! held across backend I/O.

use stash_core::FileId;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// Entries kept before an arbitrary one is dropped to make room.
pub const DEFAULT_INDEX_CAPACITY: usize = 65_536;

#[derive(Debug)]
pub struct FileIndex {
    entries: RwLock<HashMap<FileId, String>>,
    capacity: usize,
}

impl Default for FileIndex {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_INDEX_CAPACITY)
    }
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Extension recorded for `id`.
    pub async fn get(&self, id: &FileId) -> Option<String> {
        self.entries.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &FileId) -> bool {
        self.entries.read().await.contains_key(id)
    }

    pub async fn insert(&self, id: FileId, extension: String) {
        let mut entries = self.entries.write().await;
        if !entries.contains_key(&id) && entries.len() >= self.capacity {
            // A dropped entry only costs one listing on its next lookup.
            if let Some(victim) = entries.keys().next().cloned() {
                entries.remove(&victim);
            }
        }
        entries.insert(id, extension);
    }

    pub async fn remove(&self, id: &FileId) -> Option<String> {
        self.entries.write().await.remove(id)
    }

    /// Drop every entry whose identifier is not in `live`. Returns how many were dropped.
    pub async fn retain_listed(&self, live: &HashSet<FileId>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|id, _| live.contains(id));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

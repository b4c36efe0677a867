//! Bounded most-recently-used cache of resolved gateway paths.

use std::collections::VecDeque;

use mediacat_common::ObjectId;
use parking_lot::Mutex;

/// One resolved virtual path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCacheEntry {
    pub virtual_path: String,
    pub device: String,
    pub id: ObjectId,
    pub is_container: bool,
    /// Where the bytes are fetched from (items only).
    pub url: Option<String>,
    pub size: Option<u64>,
}

/// Fixed-capacity list ordered from most to least recently used.
///
/// Every operation runs under one lock, so a lookup's promotion and an
/// insert's eviction are never interleaved with another caller.
pub struct PathCache {
    capacity: usize,
    entries: Mutex<VecDeque<GatewayCacheEntry>>,
}

impl PathCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Look up `path`, moving a hit to the head.
    pub fn get(&self, path: &str) -> Option<GatewayCacheEntry> {
        let mut entries = self.entries.lock();
        let pos = entries.iter().position(|e| e.virtual_path == path)?;
        let entry = entries.remove(pos)?;
        entries.push_front(entry.clone());
        Some(entry)
    }

    /// Insert at the head, replacing any entry for the same path and
    /// evicting from the tail past capacity.
    pub fn insert(&self, entry: GatewayCacheEntry) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if let Some(pos) = entries
            .iter()
            .position(|e| e.virtual_path == entry.virtual_path)
        {
            entries.remove(pos);
        }
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }
}

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use uuid::Uuid;

/// Process-wide concurrent table backing the shared-table tier.
///
/// Cloning shares the same map. Keys are generated per put and written
/// exactly once, so readers never observe a half-updated value.
#[derive(Clone)]
pub struct SharedTable {
    id: Uuid,
    entries: Arc<DashMap<String, Bytes>>,
}

impl SharedTable {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a freshly generated key.
    pub(crate) fn insert(&self, key: String, data: Bytes) {
        self.entries.insert(key, data);
    }

    /// Remove `key`. Returns whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total payload bytes currently held.
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.value().len() as u64).sum()
    }
}

impl Default for SharedTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for SharedTable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SharedTable {}

impl fmt::Debug for SharedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTable")
            .field("id", &self.id)
            .field("entry_count", &self.len())
            .finish()
    }
}

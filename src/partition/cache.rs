use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

/// Append-only set of partition names already known to exist.
///
/// A fast path only: the storage catalog stays the source of truth. Clones
/// share the same set.
#[derive(Debug, Clone, Default)]
pub struct PartitionNameCache {
    names: Arc<Mutex<HashSet<String>>>,
}

impl PartitionNameCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.lock().contains(name)
    }

    pub fn insert(&self, name: impl Into<String>) {
        self.names.lock().insert(name.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.lock().is_empty()
    }

    /// Forgets every name. Intended for test isolation.
    pub fn clear(&self) {
        self.names.lock().clear();
    }
}

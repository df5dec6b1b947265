//! In-memory storage backend.
//!
//! Thread-safe, process-local snapshot storage. It is intended for embedded
//! usage, tests, and as a reference implementation of [`SnapshotStore`].

use std::sync::RwLock;

use crate::snapshot::Snapshot;
use crate::storage::traits::{SnapshotStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Thread-safe in-memory snapshot store.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    state: RwLock<Option<Snapshot>>,
}

impl InMemorySnapshotStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a snapshot.
    #[must_use]
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            state: RwLock::new(Some(snapshot)),
        }
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("snapshot.load"))?;
        Ok(state.clone())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("snapshot.save"))?;
        *state = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    #[test]
    fn empty_store_loads_none() {
        let store = InMemorySnapshotStore::new();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_replaces_snapshot() {
        let store = InMemorySnapshotStore::with_snapshot(Snapshot::default());
        assert!(store.load().unwrap().unwrap().is_empty());

        let snapshot = Snapshot {
            identities: vec![Identity::new("Ann Lee")],
            performance_records: Vec::new(),
        };
        store.save(&snapshot).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.identities.len(), 1);
        assert_eq!(loaded.identities[0].canonical_name, "Ann Lee");
    }
}

//! Abstract storage trait for Kyroid snapshots.
//!
//! The engine only ever loads a whole snapshot and saves a whole snapshot.
//! By keeping that behind a trait, we enable:
//! - In-memory backends for testing and embedded use
//! - File backends for the CLI and desktop use
//! - Any other medium (browser storage, a database row) supplied by the host

use thiserror::Error;

use crate::snapshot::Snapshot;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another process holds the data directory.
    #[error("Storage is locked: {0}")]
    Locked(String),

    /// Stored bytes failed an integrity check.
    #[error("Corrupted snapshot: {0}")]
    Corrupted(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

/// Storage trait for whole-snapshot load and save.
///
/// # Contract
/// - `save` must be atomic: a reader sees either the previous snapshot or
///   the new one, never a mix
/// - `load` returns `Ok(None)` when nothing has been saved yet
pub trait SnapshotStore: Send + Sync {
    /// Loads the current snapshot, if any.
    fn load(&self) -> Result<Option<Snapshot>, StorageError>;

    /// Replaces the current snapshot.
    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure the trait is object-safe
    fn _assert_snapshot_store_object_safe(_: &dyn SnapshotStore) {}

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Corrupted("crc mismatch".to_string());
        assert!(err.to_string().contains("crc mismatch"));

        let err = StorageError::BackendError("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }
}

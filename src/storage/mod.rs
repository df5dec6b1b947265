//! Snapshot storage for Kyroid.
//!
//! The [`SnapshotStore`] trait is the only thing the engine depends on.
//! [`InMemorySnapshotStore`] is always available; the file-backed store
//! lives behind the `persistent` feature.

mod memory;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::InMemorySnapshotStore;
pub use traits::{SnapshotStore, StorageError};

#[cfg(feature = "persistent")]
pub use persistent::{open_snapshot_store, FileSnapshotStore, PersistentConfig, SNAPSHOT_FILE_NAME};

//! Persistent storage backend for Kyroid.
//!
//! The whole roster lives in one snapshot file inside a data directory:
//! - File locking for single-process ownership
//! - CRC32 checksums for corruption detection
//! - Write-to-temp-then-rename saves for crash safety
//!
//! # Layout
//!
//! ```text
//! <data_dir>/
//! ├── .kyroid.lock      exclusive lock, held while the store is open
//! ├── roster.kyid       framed snapshot (magic, version, length, JSON, crc32)
//! └── roster.kyid.tmp   only present during a save
//! ```

mod codec;
mod file;
mod file_lock;

pub use file::{FileSnapshotStore, SNAPSHOT_FILE_NAME};
pub use file_lock::{FileLock, LOCK_FILE_NAME};

use std::path::Path;

use crate::error::{ConfigError, KyroidError};

/// Configuration for persistent storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentConfig {
    /// Whether to fsync the snapshot before it replaces the previous one.
    pub sync_on_write: bool,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
        }
    }
}

/// Open or create a persistent Kyroid data directory at the given path.
///
/// # Arguments
/// * `path` - Directory holding the snapshot and lock files
/// * `config` - Optional configuration (uses defaults if None)
///
/// # Errors
/// - If the path cannot be created or accessed
/// - If another process holds the lock
///
/// # Example
/// ```rust,ignore
/// use std::sync::Arc;
/// use kyroid::storage::open_snapshot_store;
/// use kyroid::RosterEngine;
///
/// let store = open_snapshot_store("./roster", None)?;
/// let engine = RosterEngine::new(Arc::new(store), Default::default());
/// ```
pub fn open_snapshot_store(
    path: impl AsRef<Path>,
    config: Option<PersistentConfig>,
) -> Result<FileSnapshotStore, KyroidError> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid {
            reason: "data directory path is empty".to_string(),
        }
        .into());
    }
    Ok(FileSnapshotStore::open(path, config.unwrap_or_default())?)
}

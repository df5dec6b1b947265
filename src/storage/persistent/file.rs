//! Single-file snapshot store.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::codec;
use super::file_lock::FileLock;
use super::PersistentConfig;
use crate::snapshot::Snapshot;
use crate::storage::traits::{SnapshotStore, StorageError};

/// File name of the snapshot inside the data directory.
pub const SNAPSHOT_FILE_NAME: &str = "roster.kyid";

const TEMP_FILE_NAME: &str = "roster.kyid.tmp";

/// Snapshot store backed by one framed file in a locked directory.
///
/// Saves go to a temporary file which is then renamed over the snapshot,
/// so a crash mid-save leaves the previous snapshot intact.
#[derive(Debug)]
pub struct FileSnapshotStore {
    dir: PathBuf,
    config: PersistentConfig,
    _lock: FileLock,
}

impl FileSnapshotStore {
    /// Opens (or creates) the data directory and takes its lock.
    ///
    /// # Errors
    /// - `StorageError::Io` if the directory cannot be created
    /// - `StorageError::Locked` if another process holds the directory
    pub fn open(dir: &Path, config: PersistentConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        let lock = FileLock::acquire(dir)?;

        // A leftover temp file is an interrupted save; the real snapshot
        // is still the last committed state.
        let temp = dir.join(TEMP_FILE_NAME);
        if temp.exists() {
            debug!(path = %temp.display(), "removing stale temp snapshot");
            fs::remove_file(&temp)?;
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            _lock: lock,
        })
    }

    /// Returns the data directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the snapshot file.
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE_NAME)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        let path = self.snapshot_path();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut reader = BufReader::new(file);
        let snapshot = codec::decode(&mut reader).map_err(|e| match e.kind() {
            ErrorKind::InvalidData | ErrorKind::UnexpectedEof => {
                StorageError::Corrupted(format!("{}: {e}", path.display()))
            }
            _ => StorageError::Io(e),
        })?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let bytes =
            codec::encode(snapshot).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let temp = self.dir.join(TEMP_FILE_NAME);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;
        if self.config.sync_on_write {
            writer.get_ref().sync_all()?;
        }
        drop(writer);

        fs::rename(&temp, self.snapshot_path())?;
        debug!(
            bytes = bytes.len(),
            identities = snapshot.identities.len(),
            records = snapshot.performance_records.len(),
            "snapshot saved"
        );
        Ok(())
    }
}

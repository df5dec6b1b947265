//! Engine configuration.
//!
//! Loaded from a TOML file; every section and key is optional and falls
//! back to its default.
//!
//! ```toml
//! [duplicates]
//! threshold = 0.9
//!
//! [storage]
//! data_dir = "/var/lib/kyroid"
//! sync_on_write = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::duplicates::{validate_threshold, DEFAULT_THRESHOLD};
use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Duplicate detection settings.
    pub duplicates: DuplicateConfig,
    /// Snapshot storage settings.
    pub storage: StorageConfig,
}

/// Duplicate detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    /// Minimum similarity for a pair to be reported. Default 0.85.
    pub threshold: f64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Snapshot storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory for the file-backed store. `None` means the caller
    /// decides (the CLI uses `./kyroid-data`).
    pub data_dir: Option<PathBuf>,
    /// Fsync each snapshot before it replaces the previous one.
    pub sync_on_write: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sync_on_write: true,
        }
    }
}

impl EngineConfig {
    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for invalid TOML and
    /// `ConfigError::Invalid` for out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise the
    /// errors of [`EngineConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Validates configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the duplicate threshold is outside
    /// `[0.0, 1.0]` or the data directory is an empty path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_threshold(self.duplicates.threshold).map_err(|e| ConfigError::Invalid {
            reason: format!("duplicates.threshold: {e}"),
        })?;

        if let Some(dir) = &self.storage.data_dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::Invalid {
                    reason: "storage.data_dir must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

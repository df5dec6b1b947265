//! Error types for Kyroid.
//!
//! All errors in Kyroid are strongly typed using thiserror.
//! Identity operations either fully apply or fail with one of these
//! errors; nothing is ever partially applied.

use thiserror::Error;

use crate::identity::IdentityId;
use crate::record::RecordId;
use crate::storage::StorageError;

/// Invalid identity operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Both sides of a merge resolve to the same identity.
    #[error("Cannot merge '{name}' into itself")]
    SelfMerge {
        /// The name as given.
        name: String,
    },

    /// The name resolves to no identity.
    #[error("Unknown identity: '{name}'")]
    UnknownIdentity {
        /// The name as given.
        name: String,
    },

    /// A rename target must already be an alias of the identity.
    #[error("Cannot rename '{current}' to '{requested}': not an existing alias of that identity")]
    RenameTargetNotAlias {
        /// Canonical name being replaced.
        current: String,
        /// The rejected new name.
        requested: String,
    },

    /// The name is not an alias of any identity.
    #[error("No identity owns the alias '{alias}'")]
    UnknownAlias {
        /// The name as given.
        alias: String,
    },

    /// Blank name.
    #[error("Identity name cannot be empty")]
    EmptyName,
}

/// Validation errors for incoming records and caller-supplied parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is absent.
    #[error("Required field '{field}' is missing")]
    MissingField {
        /// Wire name of the field.
        field: String,
    },

    /// A field is present but unusable.
    #[error("Field '{field}' is invalid: {reason}")]
    InvalidField {
        /// Wire name of the field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The record is some other JSON value.
    #[error("Record is not a JSON object")]
    NotAnObject,

    /// Threshold outside `[0.0, 1.0]`.
    #[error("Similarity threshold {value} is out of range [0.0, 1.0]")]
    ThresholdOutOfRange {
        /// The rejected threshold.
        value: f64,
    },
}

impl ValidationError {
    /// Creates a missing-field error.
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an invalid-field error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors for performance record lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// No record has this id.
    #[error("Performance record not found: {id}")]
    NotFound {
        /// The id as given.
        id: RecordId,
    },
}

/// A reconciliation payload that does not have the expected shape.
///
/// Raised before any mutation; the local snapshot is untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// Wrong top-level shape.
    #[error("Malformed reconciliation payload: {reason}")]
    Malformed {
        /// What is wrong with it.
        reason: String,
    },
}

impl PayloadError {
    /// Creates a malformed-payload error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// Invariant violations found while loading a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// One name belongs to two identities.
    #[error("Name '{name}' is claimed by both '{first}' and '{second}'")]
    NameCollision {
        /// The contested name.
        name: String,
        /// Canonical name of the first claimant.
        first: String,
        /// Canonical name of the second claimant.
        second: String,
    },

    /// A record's subject is not a canonical name.
    #[error("Record {record_id} references '{subject}', which is not a canonical name")]
    OrphanRecord {
        /// The offending record.
        record_id: RecordId,
        /// Its subject name.
        subject: String,
    },

    /// Two records share an id.
    #[error("Duplicate record id: {id}")]
    DuplicateRecordId {
        /// The repeated id.
        id: RecordId,
    },

    /// Two identities share an id.
    #[error("Duplicate identity id: {id}")]
    DuplicateIdentityId {
        /// The repeated id.
        id: IdentityId,
    },

    /// Blank canonical name.
    #[error("Identity has an empty canonical name")]
    EmptyCanonicalName,
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// Path as given.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Not valid TOML for the config shape.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Parsed but out of range.
    #[error("Invalid config: {reason}")]
    Invalid {
        /// Which value and why.
        reason: String,
    },
}

/// Top-level error type for Kyroid.
#[derive(Debug, Error)]
pub enum KyroidError {
    /// See [`IdentityError`].
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// See [`ValidationError`].
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// See [`RecordError`].
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// See [`PayloadError`].
    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),

    /// See [`SnapshotError`].
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// See [`StorageError`].
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// See [`ConfigError`].
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl KyroidError {
    /// Returns true if this is an identity error.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        matches!(self, Self::Identity(_))
    }

    /// Returns true if this is a malformed payload.
    #[must_use]
    pub const fn is_payload(&self) -> bool {
        matches!(self, Self::Payload(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result type alias for Kyroid operations.
pub type KyroidResult<T> = Result<T, KyroidError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_error_messages() {
        let err = IdentityError::SelfMerge {
            name: "Ann Lee".to_string(),
        };
        assert!(err.to_string().contains("Ann Lee"));

        let err = IdentityError::RenameTargetNotAlias {
            current: "Bob".to_string(),
            requested: "Zed".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Bob"));
        assert!(msg.contains("Zed"));
    }

    #[test]
    fn test_validation_error_helpers() {
        let err = ValidationError::missing("date");
        assert_eq!(err.to_string(), "Required field 'date' is missing");

        let err = ValidationError::invalid("time", "bad format");
        assert!(err.to_string().contains("bad format"));
    }

    #[test]
    fn test_kyroid_error_from_identity() {
        let err: KyroidError = IdentityError::EmptyName.into();
        assert!(err.is_identity());
        assert!(!err.is_payload());
    }

    #[test]
    fn test_kyroid_error_from_payload() {
        let err: KyroidError = PayloadError::malformed("not an object").into();
        assert!(err.is_payload());
        assert!(err.to_string().contains("not an object"));
    }

    #[test]
    fn test_snapshot_error_display() {
        let err = SnapshotError::NameCollision {
            name: "A.Lee".to_string(),
            first: "Ann Lee".to_string(),
            second: "Annie Lee".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("A.Lee"));
        assert!(msg.contains("Annie Lee"));
    }
}

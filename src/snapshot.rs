//! The persisted and exported document.
//!
//! One shape serves persistence, export and reconciliation input, so an
//! exported snapshot can be imported elsewhere unchanged.

use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::record::PerformanceRecord;
use crate::storage::StorageError;

/// Identities plus performance records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Every identity, sorted by canonical name.
    #[serde(default)]
    pub identities: Vec<Identity>,

    /// Every record, keyed to a canonical name.
    #[serde(default)]
    pub performance_records: Vec<PerformanceRecord>,
}

impl Snapshot {
    /// Returns true if the snapshot holds no identities and no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty() && self.performance_records.is_empty()
    }

    /// Serializes to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, StorageError> {
        serde_json::to_string_pretty(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Parses a snapshot from JSON.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the document does not match.
    pub fn from_json(text: &str) -> Result<Self, StorageError> {
        serde_json::from_str(text).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot_shape() {
        let json = Snapshot::default().to_json_pretty().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["identities"].as_array().unwrap().is_empty());
        assert!(value["performanceRecords"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let snapshot = Snapshot::from_json("{}").unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_rejects_wrong_shape() {
        assert!(Snapshot::from_json("[]").is_err());
    }
}

//! Roster engine.
//!
//! [`RosterEngine`] pairs a [`SnapshotStore`] with an [`EngineConfig`] and
//! exposes every identity operation as a single load, apply, save step.
//! The snapshot is only written when the operation succeeds, so a failed
//! operation never reaches storage.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::EngineConfig;
use crate::duplicates::{find_duplicates, DuplicateCandidate};
use crate::error::KyroidResult;
use crate::identity::{Identity, IdentityId};
use crate::reconcile::{reconcile, ReconciliationPayload, ReconciliationResult};
use crate::record::{NewRecord, PerformanceRecord, RecordEdit, RecordId};
use crate::snapshot::Snapshot;
use crate::storage::{InMemorySnapshotStore, SnapshotStore, StorageError};
use crate::store::{IdentityStore, MergeOutcome};

/// Identity resolution and reconciliation engine.
pub struct RosterEngine {
    store: Arc<dyn SnapshotStore>,
    config: EngineConfig,
    // Serializes load-apply-save within this process.
    write_guard: Mutex<()>,
}

impl std::fmt::Debug for RosterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RosterEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RosterEngine {
    /// Create a new engine over the given snapshot store.
    #[must_use]
    pub fn new(store: Arc<dyn SnapshotStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            write_guard: Mutex::new(()),
        }
    }

    /// Create an engine over a fresh in-memory store with default config.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemorySnapshotStore::new()), EngineConfig::default())
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the underlying snapshot store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    fn load(&self) -> KyroidResult<IdentityStore> {
        let snapshot = self.store.load()?.unwrap_or_default();
        Ok(IdentityStore::from_snapshot(snapshot)?)
    }

    fn commit<T>(
        &self,
        op: impl FnOnce(&mut IdentityStore) -> KyroidResult<T>,
    ) -> KyroidResult<T> {
        let _guard = self
            .write_guard
            .lock()
            .map_err(|_| StorageError::BackendError("poisoned lock: engine.commit".to_string()))?;

        let mut identities = self.load()?;
        let out = op(&mut identities)?;
        self.store.save(&identities.to_snapshot())?;
        Ok(out)
    }

    // ---- Reads ----

    /// Resolves a name to its canonical name. Unknown names resolve to
    /// themselves.
    ///
    /// # Errors
    ///
    /// Returns an error only if the snapshot cannot be loaded.
    pub fn resolve(&self, name: &str) -> KyroidResult<String> {
        let resolved = self.load()?.resolve(name);
        debug!(name, resolved = %resolved, "resolved name");
        Ok(resolved)
    }

    /// Returns the identity owning `name`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error only if the snapshot cannot be loaded.
    pub fn identity(&self, name: &str) -> KyroidResult<Option<Identity>> {
        Ok(self.load()?.identity(name).cloned())
    }

    /// Returns all identities, sorted by canonical name.
    ///
    /// # Errors
    ///
    /// Returns an error only if the snapshot cannot be loaded.
    pub fn identities(&self) -> KyroidResult<Vec<Identity>> {
        Ok(self.snapshot()?.identities)
    }

    /// Returns the records attributed to whatever `name` resolves to.
    ///
    /// # Errors
    ///
    /// Returns an error only if the snapshot cannot be loaded.
    pub fn records_for(&self, name: &str) -> KyroidResult<Vec<PerformanceRecord>> {
        Ok(self
            .load()?
            .records_for(name)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Finds likely duplicate identities.
    ///
    /// Uses the configured threshold when `threshold` is `None`.
    ///
    /// # Errors
    ///
    /// Returns `ThresholdOutOfRange` for an invalid threshold.
    pub fn find_duplicates(&self, threshold: Option<f64>) -> KyroidResult<Vec<DuplicateCandidate>> {
        let threshold = threshold.unwrap_or(self.config.duplicates.threshold);
        Ok(find_duplicates(&self.load()?, threshold)?)
    }

    /// Returns the current snapshot, validated and normalized.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored snapshot cannot be loaded or breaks an
    /// invariant.
    pub fn snapshot(&self) -> KyroidResult<Snapshot> {
        Ok(self.load()?.to_snapshot())
    }

    /// Exports the current snapshot as pretty JSON, in the same shape that
    /// [`RosterEngine::reconcile_json`] accepts.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be loaded or serialized.
    pub fn export_json(&self) -> KyroidResult<String> {
        Ok(self.snapshot()?.to_json_pretty()?)
    }

    // ---- Identity operations ----

    /// Returns the canonical name for `name`, creating an identity if the
    /// name is unknown.
    ///
    /// # Errors
    ///
    /// Returns `EmptyName` for a blank name.
    pub fn ensure_exists(&self, name: &str) -> KyroidResult<String> {
        self.commit(|s| Ok(s.ensure_exists(name)?))
    }

    /// Merges the identity of `from` into the identity of `to`.
    ///
    /// # Errors
    ///
    /// Returns `SelfMerge` or `UnknownIdentity`; nothing is saved.
    pub fn merge(&self, from: &str, to: &str) -> KyroidResult<MergeOutcome> {
        self.commit(|s| Ok(s.merge(from, to)?))
    }

    /// Promotes one of an identity's aliases to its canonical name.
    ///
    /// Returns the number of records relabeled.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIdentity` or `RenameTargetNotAlias`.
    pub fn rename_canonical(&self, current: &str, new_canonical: &str) -> KyroidResult<usize> {
        self.commit(|s| Ok(s.rename_canonical(current, new_canonical)?))
    }

    /// Merges two identities and picks the surviving canonical name.
    ///
    /// # Errors
    ///
    /// Returns `SelfMerge`, `UnknownIdentity` or `RenameTargetNotAlias`.
    pub fn merge_with_final_name(
        &self,
        from: &str,
        to: &str,
        final_name: &str,
    ) -> KyroidResult<String> {
        self.commit(|s| Ok(s.merge_with_final_name(from, to, final_name)?))
    }

    /// Splits an alias off into a new identity with no records.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAlias`.
    pub fn unmerge_alias(&self, alias: &str) -> KyroidResult<IdentityId> {
        self.commit(|s| Ok(s.unmerge_alias(alias)?))
    }

    // ---- Records ----

    /// Records a performance, attributing it to the resolved subject.
    ///
    /// # Errors
    ///
    /// Returns `EmptyName` for a blank subject.
    pub fn record_performance(&self, new: NewRecord) -> KyroidResult<RecordId> {
        self.commit(|s| Ok(s.record_performance(new)?))
    }

    /// Applies an edit to an existing record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, a validation error, or `EmptyName`.
    pub fn update_record(&self, id: &RecordId, edit: RecordEdit) -> KyroidResult<()> {
        self.commit(|s| s.update_record(id, edit))
    }

    /// Deletes a record and returns it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`.
    pub fn delete_record(&self, id: &RecordId) -> KyroidResult<PerformanceRecord> {
        self.commit(|s| Ok(s.delete_record(id)?))
    }

    // ---- Reconciliation ----

    /// Reconciles a JSON payload into the roster.
    ///
    /// The payload is parsed before the snapshot is loaded, so a malformed
    /// payload never changes anything.
    ///
    /// # Errors
    ///
    /// Returns `PayloadError::Malformed` for a payload of the wrong shape.
    pub fn reconcile_json(&self, text: &str) -> KyroidResult<ReconciliationResult> {
        let payload = ReconciliationPayload::from_json(text)?;
        self.reconcile(payload)
    }

    /// Reconciles an already-parsed payload into the roster.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured threshold is invalid or storage
    /// fails.
    pub fn reconcile(&self, payload: ReconciliationPayload) -> KyroidResult<ReconciliationResult> {
        let threshold = self.config.duplicates.threshold;
        self.commit(|s| reconcile(s, payload, threshold))
    }
}

impl Default for RosterEngine {
    fn default() -> Self {
        Self::in_memory()
    }
}

//! The identity store.
//!
//! Holds every identity, a name index covering canonical names and aliases,
//! and every performance record. The name index is what enforces the global
//! uniqueness invariant: a name string maps to at most one identity.
//!
//! Every mutating operation checks all of its preconditions before touching
//! any state, so a failed operation leaves the store exactly as it was.
//! Merge and rename rewrite record subjects in a single pass over all
//! records.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{IdentityError, KyroidResult, RecordError, SnapshotError};
use crate::identity::{Identity, IdentityId};
use crate::record::{NewRecord, PerformanceRecord, RecordEdit, RecordId};
use crate::snapshot::Snapshot;

/// Whether a name is an identity's canonical name or one of its aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameRole {
    /// The name labels the identity's records.
    Canonical,
    /// An alternate spelling routed to the canonical name.
    Alias,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NameEntry {
    id: IdentityId,
    role: NameRole,
}

/// Summary of a successful merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Canonical name of the surviving identity.
    pub canonical: String,
    /// Canonical name of the identity that was absorbed.
    pub absorbed: String,
    /// Number of records re-attributed.
    pub records_moved: usize,
}

/// In-memory identity and record state.
#[derive(Debug, Clone, Default)]
pub struct IdentityStore {
    identities: BTreeMap<IdentityId, Identity>,
    by_name: HashMap<String, NameEntry>,
    records: BTreeMap<RecordId, PerformanceRecord>,
}

impl IdentityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a snapshot, validating its invariants.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if a name is claimed twice, an identity id or
    /// record id repeats, a canonical name is empty, or a record's subject is
    /// not a canonical name.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, SnapshotError> {
        let mut store = Self::new();

        for identity in snapshot.identities {
            if identity.canonical_name.trim().is_empty() {
                return Err(SnapshotError::EmptyCanonicalName);
            }
            if store.identities.contains_key(&identity.id) {
                return Err(SnapshotError::DuplicateIdentityId { id: identity.id });
            }
            for (index, name) in identity.names().enumerate() {
                if let Some(existing) = store.by_name.get(name) {
                    let first = store
                        .identities
                        .get(&existing.id)
                        .map_or_else(|| identity.canonical_name.clone(), |i| i.canonical_name.clone());
                    return Err(SnapshotError::NameCollision {
                        name: name.to_string(),
                        first,
                        second: identity.canonical_name.clone(),
                    });
                }
                let role = if index == 0 { NameRole::Canonical } else { NameRole::Alias };
                store
                    .by_name
                    .insert(name.to_string(), NameEntry { id: identity.id, role });
            }
            store.identities.insert(identity.id, identity);
        }

        for record in snapshot.performance_records {
            if store.records.contains_key(&record.id) {
                return Err(SnapshotError::DuplicateRecordId { id: record.id });
            }
            if !store.is_canonical(&record.subject_name) {
                return Err(SnapshotError::OrphanRecord {
                    record_id: record.id,
                    subject: record.subject_name,
                });
            }
            store.records.insert(record.id.clone(), record);
        }

        Ok(store)
    }

    /// Exports the current state. Identities are ordered by canonical name.
    #[must_use]
    pub fn to_snapshot(&self) -> Snapshot {
        let mut identities: Vec<Identity> = self.identities.values().cloned().collect();
        identities.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));
        Snapshot {
            identities,
            performance_records: self.records.values().cloned().collect(),
        }
    }

    // ---------------------------------------------------------------------
    // Lookups
    // ---------------------------------------------------------------------

    /// Maps a name to its canonical form.
    ///
    /// Canonical names map to themselves, aliases to their owner's canonical
    /// name, and unknown names pass through unchanged. Never fails and never
    /// creates an identity. `resolve(resolve(x)) == resolve(x)`.
    #[must_use]
    pub fn resolve(&self, name: &str) -> String {
        match self.by_name.get(name) {
            Some(entry) if entry.role == NameRole::Alias => self
                .identities
                .get(&entry.id)
                .map_or_else(|| name.to_string(), |i| i.canonical_name.clone()),
            _ => name.to_string(),
        }
    }

    /// Returns the identity that owns `name`, as canonical name or alias.
    #[must_use]
    pub fn identity(&self, name: &str) -> Option<&Identity> {
        self.by_name
            .get(name)
            .and_then(|entry| self.identities.get(&entry.id))
    }

    /// Returns the identity owning `name` together with the role it plays.
    #[must_use]
    pub fn owner_of(&self, name: &str) -> Option<(&Identity, NameRole)> {
        let entry = self.by_name.get(name)?;
        self.identities.get(&entry.id).map(|i| (i, entry.role))
    }

    /// Returns true if `name` is some identity's canonical name.
    #[must_use]
    pub fn is_canonical(&self, name: &str) -> bool {
        self.by_name
            .get(name)
            .is_some_and(|entry| entry.role == NameRole::Canonical)
    }

    /// Iterates over all identities.
    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.identities.values()
    }

    /// Number of identities.
    #[must_use]
    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }

    /// All canonical names, sorted.
    #[must_use]
    pub fn canonical_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .identities
            .values()
            .map(|i| i.canonical_name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Iterates over all performance records.
    pub fn records(&self) -> impl Iterator<Item = &PerformanceRecord> {
        self.records.values()
    }

    /// Number of performance records.
    #[must_use]
    pub fn record_len(&self) -> usize {
        self.records.len()
    }

    /// Looks up a record by id.
    #[must_use]
    pub fn record(&self, id: &RecordId) -> Option<&PerformanceRecord> {
        self.records.get(id)
    }

    /// Records attributed to the identity `name` resolves to.
    #[must_use]
    pub fn records_for(&self, name: &str) -> Vec<&PerformanceRecord> {
        let canonical = self.resolve(name);
        self.records
            .values()
            .filter(|r| r.subject_name == canonical)
            .collect()
    }

    /// Number of records whose subject is exactly `canonical`.
    #[must_use]
    pub fn record_count(&self, canonical: &str) -> usize {
        self.records
            .values()
            .filter(|r| r.subject_name == canonical)
            .count()
    }

    /// Record counts keyed by subject name, computed in one pass.
    #[must_use]
    pub fn record_counts(&self) -> HashMap<&str, usize> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for record in self.records.values() {
            *counts.entry(record.subject_name.as_str()).or_default() += 1;
        }
        counts
    }

    /// Fastest record per `(event, distance)` for the identity `name`
    /// resolves to, ordered by event then distance.
    #[must_use]
    pub fn personal_bests(&self, name: &str) -> Vec<&PerformanceRecord> {
        let mut best: BTreeMap<(&str, u32), &PerformanceRecord> = BTreeMap::new();
        for record in self.records_for(name) {
            best.entry((record.event.as_str(), record.distance))
                .and_modify(|current| {
                    if record.cmp_by_time(current).is_lt() {
                        *current = record;
                    }
                })
                .or_insert(record);
        }
        best.into_values().collect()
    }

    // ---------------------------------------------------------------------
    // Identity operations
    // ---------------------------------------------------------------------

    /// Makes sure an identity exists for `name` and returns its canonical
    /// name.
    ///
    /// A name that is already an alias is not turned into a second identity;
    /// the alias owner's canonical name is returned instead.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::EmptyName` for empty or whitespace-only names.
    pub fn ensure_exists(&mut self, name: &str) -> Result<String, IdentityError> {
        if name.trim().is_empty() {
            return Err(IdentityError::EmptyName);
        }
        if self.by_name.contains_key(name) {
            return Ok(self.resolve(name));
        }

        let identity = Identity::new(name);
        debug!(identity_id = %identity.id, name, "created identity");
        self.insert_identity(identity);
        Ok(name.to_string())
    }

    /// Merges the identity `from` resolves to into the one `to` resolves to.
    ///
    /// The `to` identity keeps its canonical name and gains `from`'s
    /// canonical name and aliases; every record of `from` is re-attributed;
    /// the `from` identity is removed.
    ///
    /// # Errors
    ///
    /// - `UnknownIdentity` if either side does not resolve to an identity
    /// - `SelfMerge` if both resolve to the same identity
    pub fn merge(&mut self, from: &str, to: &str) -> Result<MergeOutcome, IdentityError> {
        let (from_id, to_id) = self.merge_pair(from, to)?;

        let absorbed = self
            .identities
            .get(&from_id)
            .cloned()
            .ok_or_else(|| IdentityError::UnknownIdentity { name: from.to_string() })?;
        let target = self
            .identities
            .get_mut(&to_id)
            .ok_or_else(|| IdentityError::UnknownIdentity { name: to.to_string() })?;

        for name in absorbed.names() {
            if name != target.canonical_name && !target.has_alias(name) {
                target.aliases.push(name.to_string());
            }
        }
        target.touch();
        let canonical = target.canonical_name.clone();

        for name in absorbed.names() {
            self.by_name.insert(
                name.to_string(),
                NameEntry {
                    id: to_id,
                    role: NameRole::Alias,
                },
            );
        }
        self.identities.remove(&from_id);

        let records_moved = self.rewrite_subjects(&absorbed.canonical_name, &canonical);

        info!(
            from = %absorbed.canonical_name,
            to = %canonical,
            records_moved,
            "merged identities"
        );

        Ok(MergeOutcome {
            canonical,
            absorbed: absorbed.canonical_name,
            records_moved,
        })
    }

    /// Swaps an identity's canonical name with one of its aliases.
    ///
    /// Returns the number of records rewritten. Renaming to an arbitrary
    /// string is not allowed here; use [`Self::merge_with_final_name`].
    ///
    /// # Errors
    ///
    /// - `UnknownIdentity` if `current` is not a canonical name
    /// - `RenameTargetNotAlias` if `new_canonical` is not one of its aliases
    pub fn rename_canonical(
        &mut self,
        current: &str,
        new_canonical: &str,
    ) -> Result<usize, IdentityError> {
        if current == new_canonical {
            return Ok(0);
        }

        let id = self
            .canonical_id(current)
            .ok_or_else(|| IdentityError::UnknownIdentity { name: current.to_string() })?;
        let identity = self
            .identities
            .get_mut(&id)
            .ok_or_else(|| IdentityError::UnknownIdentity { name: current.to_string() })?;
        if !identity.has_alias(new_canonical) {
            return Err(IdentityError::RenameTargetNotAlias {
                current: current.to_string(),
                requested: new_canonical.to_string(),
            });
        }

        identity.aliases.retain(|a| a != new_canonical);
        identity.aliases.push(current.to_string());
        identity.canonical_name = new_canonical.to_string();
        identity.touch();

        self.by_name.insert(
            new_canonical.to_string(),
            NameEntry {
                id,
                role: NameRole::Canonical,
            },
        );
        self.by_name.insert(
            current.to_string(),
            NameEntry {
                id,
                role: NameRole::Alias,
            },
        );

        let rewritten = self.rewrite_subjects(current, new_canonical);
        info!(from = current, to = new_canonical, rewritten, "renamed canonical name");
        Ok(rewritten)
    }

    /// Merges `from` into `to`, then renames the survivor to `final_name`.
    ///
    /// `final_name` must be one of the two identities' canonical names or
    /// aliases. It is checked before anything changes, so a bad name never
    /// leaves a half-applied merge. Returns the resulting canonical name.
    ///
    /// # Errors
    ///
    /// Same as [`Self::merge`], plus `RenameTargetNotAlias` when
    /// `final_name` is not among the merged names.
    pub fn merge_with_final_name(
        &mut self,
        from: &str,
        to: &str,
        final_name: &str,
    ) -> Result<String, IdentityError> {
        let (from_id, to_id) = self.merge_pair(from, to)?;
        let allowed = [from_id, to_id]
            .iter()
            .filter_map(|id| self.identities.get(id))
            .any(|identity| identity.names().any(|n| n == final_name));
        if !allowed {
            return Err(IdentityError::RenameTargetNotAlias {
                current: self.resolve(to),
                requested: final_name.to_string(),
            });
        }

        let outcome = self.merge(from, to)?;
        if outcome.canonical != final_name {
            self.rename_canonical(&outcome.canonical, final_name)?;
        }
        Ok(final_name.to_string())
    }

    /// Detaches `alias` from its owner into a new, independent identity.
    ///
    /// Records are not touched: whatever was recorded under the alias before
    /// a merge stays with the former owner. The new identity starts with no
    /// aliases and no records. This cannot be undone.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAlias` if no identity owns `alias` as an alias.
    pub fn unmerge_alias(&mut self, alias: &str) -> Result<IdentityId, IdentityError> {
        let owner_id = match self.by_name.get(alias) {
            Some(entry) if entry.role == NameRole::Alias => entry.id,
            _ => {
                return Err(IdentityError::UnknownAlias {
                    alias: alias.to_string(),
                })
            }
        };
        let owner = self
            .identities
            .get_mut(&owner_id)
            .ok_or_else(|| IdentityError::UnknownAlias { alias: alias.to_string() })?;
        owner.remove_alias(alias);
        let former_owner = owner.canonical_name.clone();

        self.by_name.remove(alias);
        let detached = Identity::new(alias);
        let id = detached.id;
        self.insert_identity(detached);

        warn!(
            alias,
            former_owner = %former_owner,
            "unmerged alias; records stay with the former owner"
        );
        Ok(id)
    }

    // ---------------------------------------------------------------------
    // Record operations
    // ---------------------------------------------------------------------

    /// Records a new performance and returns its id.
    ///
    /// The subject is resolved first; an unseen name creates its identity.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::EmptyName` if the subject is blank.
    pub fn record_performance(&mut self, new: NewRecord) -> Result<RecordId, IdentityError> {
        let canonical = self.ensure_exists(&self.resolve(&new.subject_name))?;
        let id = RecordId::generate();
        let record = PerformanceRecord::from_new(id.clone(), canonical, new);
        debug!(record_id = %id, subject = %record.subject_name, "recorded performance");
        self.records.insert(id.clone(), record);
        Ok(id)
    }

    /// Applies an edit to a record and bumps its `last_modified`.
    ///
    /// # Errors
    ///
    /// - `ValidationError` if the edit is invalid
    /// - `RecordError::NotFound` if no record has this id
    pub fn update_record(&mut self, id: &RecordId, edit: RecordEdit) -> KyroidResult<()> {
        edit.validate()?;
        if !self.records.contains_key(id) {
            return Err(RecordError::NotFound { id: id.clone() }.into());
        }

        let subject = match edit.subject_name.as_deref() {
            Some(name) => Some(self.ensure_exists(&self.resolve(name))?),
            None => None,
        };

        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| RecordError::NotFound { id: id.clone() })?;
        if let Some(subject) = subject {
            record.subject_name = subject;
        }
        edit.apply_attributes(record);
        record.last_modified = Utc::now();
        debug!(record_id = %id, "updated performance record");
        Ok(())
    }

    /// Deletes a record and returns it.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::NotFound` if no record has this id.
    pub fn delete_record(&mut self, id: &RecordId) -> Result<PerformanceRecord, RecordError> {
        let record = self
            .records
            .remove(id)
            .ok_or_else(|| RecordError::NotFound { id: id.clone() })?;
        debug!(record_id = %id, "deleted performance record");
        Ok(record)
    }

    /// Checks the name-uniqueness and record-subject invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn check_invariants(&self) -> Result<(), SnapshotError> {
        Self::from_snapshot(self.to_snapshot()).map(|_| ())
    }

    // ---------------------------------------------------------------------
    // Crate-internal building blocks for reconciliation
    // ---------------------------------------------------------------------

    /// Inserts an identity whose names are all unclaimed.
    pub(crate) fn insert_identity(&mut self, identity: Identity) {
        for (index, name) in identity.names().enumerate() {
            let role = if index == 0 { NameRole::Canonical } else { NameRole::Alias };
            self.by_name
                .insert(name.to_string(), NameEntry { id: identity.id, role });
        }
        self.identities.insert(identity.id, identity);
    }

    /// Adds an unclaimed alias to an identity. Returns false if it was not
    /// added (unknown identity or name already claimed).
    pub(crate) fn add_alias(&mut self, id: IdentityId, alias: &str) -> bool {
        if self.by_name.contains_key(alias) {
            return false;
        }
        let Some(identity) = self.identities.get_mut(&id) else {
            return false;
        };
        if !identity.add_alias(alias) {
            return false;
        }
        self.by_name.insert(
            alias.to_string(),
            NameEntry {
                id,
                role: NameRole::Alias,
            },
        );
        true
    }

    /// Inserts or replaces a record whose subject is already canonical.
    pub(crate) fn put_record(&mut self, record: PerformanceRecord) {
        self.records.insert(record.id.clone(), record);
    }

    fn canonical_id(&self, name: &str) -> Option<IdentityId> {
        match self.by_name.get(name) {
            Some(entry) if entry.role == NameRole::Canonical => Some(entry.id),
            _ => None,
        }
    }

    fn merge_pair(&self, from: &str, to: &str) -> Result<(IdentityId, IdentityId), IdentityError> {
        let from_canonical = self.resolve(from);
        let to_canonical = self.resolve(to);
        let from_id = self
            .canonical_id(&from_canonical)
            .ok_or_else(|| IdentityError::UnknownIdentity { name: from.to_string() })?;
        let to_id = self
            .canonical_id(&to_canonical)
            .ok_or_else(|| IdentityError::UnknownIdentity { name: to.to_string() })?;
        if from_id == to_id {
            return Err(IdentityError::SelfMerge { name: to_canonical });
        }
        Ok((from_id, to_id))
    }

    fn rewrite_subjects(&mut self, from: &str, to: &str) -> usize {
        let mut rewritten = 0;
        for record in self.records.values_mut() {
            if record.subject_name == from {
                record.subject_name = to.to_string();
                rewritten += 1;
            }
        }
        rewritten
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::NaiveDate;

    use super::*;
    use crate::record::RaceTime;

    fn perf(subject: &str, event: &str, time: &str) -> NewRecord {
        NewRecord::new(
            subject,
            event,
            100,
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            time.parse::<RaceTime>().unwrap(),
        )
        .unwrap()
    }

    fn alias_set(store: &IdentityStore, name: &str) -> HashSet<String> {
        store.identity(name).unwrap().aliases.iter().cloned().collect()
    }

    #[test]
    fn resolve_passes_unknown_names_through() {
        let store = IdentityStore::new();
        assert_eq!(store.resolve("Nobody"), "Nobody");
        assert_eq!(store.identity_count(), 0);
    }

    #[test]
    fn resolve_maps_aliases_and_is_idempotent() {
        let mut store = IdentityStore::new();
        store.insert_identity(Identity::with_aliases("Ann Lee", ["A.Lee"]));

        assert_eq!(store.resolve("A.Lee"), "Ann Lee");
        assert_eq!(store.resolve("Ann Lee"), "Ann Lee");
        for name in ["A.Lee", "Ann Lee", "ann lee", ""] {
            let once = store.resolve(name);
            assert_eq!(store.resolve(&once), once);
        }
    }

    #[test]
    fn resolve_is_case_sensitive() {
        let mut store = IdentityStore::new();
        store.ensure_exists("Ann Lee").unwrap();
        assert_eq!(store.resolve("ann lee"), "ann lee");
    }

    #[test]
    fn ensure_exists_creates_once() {
        let mut store = IdentityStore::new();
        assert_eq!(store.ensure_exists("Ann Lee").unwrap(), "Ann Lee");
        assert_eq!(store.ensure_exists("Ann Lee").unwrap(), "Ann Lee");
        assert_eq!(store.identity_count(), 1);
        assert!(store.identity("Ann Lee").unwrap().aliases.is_empty());
    }

    #[test]
    fn ensure_exists_does_not_shadow_aliases() {
        let mut store = IdentityStore::new();
        store.insert_identity(Identity::with_aliases("Ann Lee", ["A.Lee"]));
        assert_eq!(store.ensure_exists("A.Lee").unwrap(), "Ann Lee");
        assert_eq!(store.identity_count(), 1);
    }

    #[test]
    fn ensure_exists_rejects_blank_names() {
        let mut store = IdentityStore::new();
        assert_eq!(store.ensure_exists("  "), Err(IdentityError::EmptyName));
    }

    #[test]
    fn record_performance_creates_identity_lazily_and_resolves_aliases() {
        let mut store = IdentityStore::new();
        store.insert_identity(Identity::with_aliases("Ann Lee", ["A.Lee"]));

        let id = store.record_performance(perf("A.Lee", "freestyle", "59.00")).unwrap();
        assert_eq!(store.record(&id).unwrap().subject_name, "Ann Lee");

        store.record_performance(perf("Bo Chen", "freestyle", "58.00")).unwrap();
        assert!(store.is_canonical("Bo Chen"));
        store.check_invariants().unwrap();
    }

    #[test]
    fn merge_moves_records_and_names() {
        let mut store = IdentityStore::new();
        store.insert_identity(Identity::with_aliases("Bob Jones", ["B. Jones"]));
        store.ensure_exists("Robert Jones").unwrap();
        let r1 = store.record_performance(perf("Bob Jones", "fly", "1:01.00")).unwrap();
        store.record_performance(perf("Robert Jones", "fly", "1:00.00")).unwrap();

        let outcome = store.merge("Bob Jones", "Robert Jones").unwrap();
        assert_eq!(outcome.canonical, "Robert Jones");
        assert_eq!(outcome.absorbed, "Bob Jones");
        assert_eq!(outcome.records_moved, 1);

        assert_eq!(store.record(&r1).unwrap().subject_name, "Robert Jones");
        assert!(!store.is_canonical("Bob Jones"));
        assert_eq!(store.resolve("Bob Jones"), store.resolve("Robert Jones"));
        assert_eq!(store.resolve("B. Jones"), "Robert Jones");
        assert_eq!(
            alias_set(&store, "Robert Jones"),
            HashSet::from(["Bob Jones".to_string(), "B. Jones".to_string()])
        );
        assert_eq!(store.identity_count(), 1);
        store.check_invariants().unwrap();
    }

    #[test]
    fn merge_accepts_aliases_as_arguments() {
        let mut store = IdentityStore::new();
        store.insert_identity(Identity::with_aliases("Ann Lee", ["A.Lee"]));
        store.ensure_exists("Annie Lee").unwrap();

        let outcome = store.merge("Annie Lee", "A.Lee").unwrap();
        assert_eq!(outcome.canonical, "Ann Lee");
    }

    #[test]
    fn merge_bumps_survivor_version() {
        let mut store = IdentityStore::new();
        store.ensure_exists("A").unwrap();
        store.ensure_exists("B").unwrap();
        let before = store.identity("B").unwrap().version;
        store.merge("A", "B").unwrap();
        assert!(store.identity("B").unwrap().version > before);
    }

    #[test]
    fn merge_rejects_self_and_unknown() {
        let mut store = IdentityStore::new();
        store.insert_identity(Identity::with_aliases("Ann Lee", ["A.Lee"]));

        assert_eq!(
            store.merge("A.Lee", "Ann Lee"),
            Err(IdentityError::SelfMerge {
                name: "Ann Lee".to_string()
            })
        );
        assert!(matches!(
            store.merge("Ghost", "Ann Lee"),
            Err(IdentityError::UnknownIdentity { .. })
        ));
        assert!(matches!(
            store.merge("Ann Lee", "Ghost"),
            Err(IdentityError::UnknownIdentity { .. })
        ));
        assert_eq!(store.identity_count(), 1);
    }

    #[test]
    fn rename_swaps_canonical_and_alias() {
        let mut store = IdentityStore::new();
        store.insert_identity(Identity::with_aliases("Ann Lee", ["Annie Lee"]));
        let r = store.record_performance(perf("Ann Lee", "back", "1:05.00")).unwrap();

        assert_eq!(store.rename_canonical("Ann Lee", "Annie Lee").unwrap(), 1);
        assert!(store.is_canonical("Annie Lee"));
        assert_eq!(store.resolve("Ann Lee"), "Annie Lee");
        assert_eq!(store.record(&r).unwrap().subject_name, "Annie Lee");
        assert_eq!(alias_set(&store, "Annie Lee"), HashSet::from(["Ann Lee".to_string()]));
        store.check_invariants().unwrap();
    }

    #[test]
    fn rename_to_same_name_is_noop() {
        let mut store = IdentityStore::new();
        store.ensure_exists("Ann Lee").unwrap();
        let version = store.identity("Ann Lee").unwrap().version;
        assert_eq!(store.rename_canonical("Ann Lee", "Ann Lee").unwrap(), 0);
        assert_eq!(store.identity("Ann Lee").unwrap().version, version);
    }

    #[test]
    fn rename_rejects_unrelated_names() {
        let mut store = IdentityStore::new();
        store.ensure_exists("Ann Lee").unwrap();
        store.ensure_exists("Bo Chen").unwrap();

        assert!(matches!(
            store.rename_canonical("Ann Lee", "Totally New"),
            Err(IdentityError::RenameTargetNotAlias { .. })
        ));
        assert!(matches!(
            store.rename_canonical("Ann Lee", "Bo Chen"),
            Err(IdentityError::RenameTargetNotAlias { .. })
        ));
        assert!(matches!(
            store.rename_canonical("Ghost", "Ann Lee"),
            Err(IdentityError::UnknownIdentity { .. })
        ));
    }

    #[test]
    fn merge_with_final_name_uses_alias_from_either_side() {
        let mut store = IdentityStore::new();
        store.insert_identity(Identity::with_aliases("Bob Jones", ["Bobby Jones"]));
        store.ensure_exists("Robert Jones").unwrap();
        let r = store.record_performance(perf("Bob Jones", "free", "55.00")).unwrap();

        let final_name = store
            .merge_with_final_name("Bob Jones", "Robert Jones", "Bobby Jones")
            .unwrap();
        assert_eq!(final_name, "Bobby Jones");
        assert!(store.is_canonical("Bobby Jones"));
        assert_eq!(
            alias_set(&store, "Bobby Jones"),
            HashSet::from(["Robert Jones".to_string(), "Bob Jones".to_string()])
        );
        assert_eq!(store.record(&r).unwrap().subject_name, "Bobby Jones");
        store.check_invariants().unwrap();
    }

    #[test]
    fn merge_with_final_name_keeps_target_when_final_is_target() {
        let mut store = IdentityStore::new();
        store.ensure_exists("Bob Jones").unwrap();
        store.ensure_exists("Robert Jones").unwrap();

        let final_name = store
            .merge_with_final_name("Bob Jones", "Robert Jones", "Robert Jones")
            .unwrap();
        assert_eq!(final_name, "Robert Jones");
        assert_eq!(alias_set(&store, "Robert Jones"), HashSet::from(["Bob Jones".to_string()]));
    }

    #[test]
    fn merge_with_final_name_rejects_foreign_name_without_merging() {
        let mut store = IdentityStore::new();
        store.ensure_exists("Bob Jones").unwrap();
        store.ensure_exists("Robert Jones").unwrap();

        assert!(matches!(
            store.merge_with_final_name("Bob Jones", "Robert Jones", "Rob J"),
            Err(IdentityError::RenameTargetNotAlias { .. })
        ));
        assert!(store.is_canonical("Bob Jones"));
        assert!(store.is_canonical("Robert Jones"));
        assert_eq!(store.identity_count(), 2);
    }

    #[test]
    fn unmerge_alias_creates_fresh_identity_without_records() {
        let mut store = IdentityStore::new();
        store.ensure_exists("Bob Jones").unwrap();
        store.ensure_exists("Robert Jones").unwrap();
        store.record_performance(perf("Bob Jones", "free", "55.00")).unwrap();
        store.merge("Bob Jones", "Robert Jones").unwrap();

        store.unmerge_alias("Bob Jones").unwrap();

        assert!(store.is_canonical("Bob Jones"));
        assert!(store.identity("Bob Jones").unwrap().aliases.is_empty());
        assert_eq!(store.record_count("Bob Jones"), 0);
        assert_eq!(store.record_count("Robert Jones"), 1);
        assert!(!store.identity("Robert Jones").unwrap().has_alias("Bob Jones"));
        store.check_invariants().unwrap();
    }

    #[test]
    fn unmerge_rejects_unknown_alias_and_canonical_names() {
        let mut store = IdentityStore::new();
        store.ensure_exists("Ann Lee").unwrap();
        assert!(matches!(
            store.unmerge_alias("Ghost"),
            Err(IdentityError::UnknownAlias { .. })
        ));
        assert!(matches!(
            store.unmerge_alias("Ann Lee"),
            Err(IdentityError::UnknownAlias { .. })
        ));
    }

    #[test]
    fn update_record_reresolves_subject_and_bumps_timestamp() {
        let mut store = IdentityStore::new();
        store.insert_identity(Identity::with_aliases("Ann Lee", ["A.Lee"]));
        let id = store.record_performance(perf("Bo Chen", "free", "59.00")).unwrap();
        let before = store.record(&id).unwrap().last_modified;

        store
            .update_record(
                &id,
                RecordEdit {
                    subject_name: Some("A.Lee".to_string()),
                    ..RecordEdit::default()
                },
            )
            .unwrap();

        let record = store.record(&id).unwrap();
        assert_eq!(record.subject_name, "Ann Lee");
        assert!(record.last_modified >= before);
    }

    #[test]
    fn update_and_delete_unknown_record_fail() {
        let mut store = IdentityStore::new();
        let missing = RecordId::from("missing");
        assert!(store.update_record(&missing, RecordEdit::default()).is_err());
        assert_eq!(
            store.delete_record(&missing),
            Err(RecordError::NotFound { id: missing.clone() })
        );
    }

    #[test]
    fn personal_bests_pick_fastest_per_event() {
        let mut store = IdentityStore::new();
        store.record_performance(perf("Ann Lee", "free", "59.00")).unwrap();
        store.record_performance(perf("Ann Lee", "free", "58.10")).unwrap();
        store.record_performance(perf("Ann Lee", "back", "1:04.00")).unwrap();

        let bests = store.personal_bests("Ann Lee");
        assert_eq!(bests.len(), 2);
        assert_eq!(bests[0].event, "back");
        assert_eq!(bests[1].time.to_string(), "58.10");
    }

    #[test]
    fn snapshot_roundtrip_preserves_state() {
        let mut store = IdentityStore::new();
        store.insert_identity(Identity::with_aliases("Ann Lee", ["A.Lee"]));
        store.record_performance(perf("A.Lee", "free", "59.00")).unwrap();

        let restored = IdentityStore::from_snapshot(store.to_snapshot()).unwrap();
        assert_eq!(restored.resolve("A.Lee"), "Ann Lee");
        assert_eq!(restored.record_count("Ann Lee"), 1);
    }

    #[test]
    fn from_snapshot_rejects_name_collisions() {
        let snapshot = Snapshot {
            identities: vec![
                Identity::with_aliases("Ann Lee", ["A.Lee"]),
                Identity::with_aliases("Annie Lee", ["A.Lee"]),
            ],
            performance_records: Vec::new(),
        };
        assert!(matches!(
            IdentityStore::from_snapshot(snapshot),
            Err(SnapshotError::NameCollision { .. })
        ));
    }

    #[test]
    fn from_snapshot_rejects_alias_subjects() {
        let mut store = IdentityStore::new();
        store.insert_identity(Identity::with_aliases("Ann Lee", ["A.Lee"]));
        store.record_performance(perf("Ann Lee", "free", "59.00")).unwrap();
        let mut snapshot = store.to_snapshot();
        snapshot.performance_records[0].subject_name = "A.Lee".to_string();

        assert!(matches!(
            IdentityStore::from_snapshot(snapshot),
            Err(SnapshotError::OrphanRecord { .. })
        ));
    }
}

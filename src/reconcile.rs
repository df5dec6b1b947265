//! Import-time reconciliation of an external snapshot into the local store.
//!
//! Two passes run in order. The identity pass folds incoming identities and
//! aliases into the store, reporting alias conflicts instead of reassigning
//! names. The record pass then validates each incoming record on its own,
//! attributes it to a resolved identity, and keeps whichever copy of an
//! already-known record was modified last. Local data wins every tie.
//!
//! Only a payload that does not have the expected shape fails the whole
//! call, and it fails before the store is touched. A bad record is skipped
//! and reported; the rest of the batch continues.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::duplicates::{find_duplicates, validate_threshold, DuplicateCandidate};
use crate::error::{KyroidResult, PayloadError, ValidationError};
use crate::identity::Identity;
use crate::record::{PerformanceRecord, RaceTime, RecordId};
use crate::store::{IdentityStore, NameRole};

/// An identity as described by the incoming dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingIdentity {
    /// The incoming side's canonical name.
    pub canonical_name: String,

    /// The incoming side's aliases.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl IncomingIdentity {
    /// Creates an incoming identity.
    #[must_use]
    pub fn new<I, S>(canonical_name: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            canonical_name: canonical_name.into(),
            aliases: aliases.into_iter().map(Into::into).collect(),
        }
    }
}

/// A structurally valid reconciliation input.
///
/// Identities are fully typed; records stay raw so each one can be
/// validated, and rejected, on its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationPayload {
    /// Identities, applied before any record.
    pub identities: Vec<IncomingIdentity>,
    /// Raw `performanceRecords` entries.
    pub records: Vec<Value>,
}

impl ReconciliationPayload {
    /// Parses a payload from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `PayloadError::Malformed` if the text is not JSON or does not
    /// have the `{identities, performanceRecords}` shape.
    pub fn from_json(text: &str) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| PayloadError::malformed(format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Parses a payload from an already-decoded JSON value.
    ///
    /// Both sections are optional; a missing section is empty.
    ///
    /// # Errors
    ///
    /// Returns `PayloadError::Malformed` if the top level is not an object,
    /// a section is not an array, or an identity entry is not shaped as
    /// `{canonicalName: string, aliases?: [string]}`.
    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        let Value::Object(mut top) = value else {
            return Err(PayloadError::malformed("top level must be an object"));
        };

        let identities = match top.remove("identities") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    serde_json::from_value::<IncomingIdentity>(item).map_err(|e| {
                        PayloadError::malformed(format!("identities[{index}]: {e}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(PayloadError::malformed("'identities' must be an array")),
        };

        let records = match top.remove("performanceRecords") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(PayloadError::malformed(
                    "'performanceRecords' must be an array",
                ))
            }
        };

        Ok(Self {
            identities,
            records,
        })
    }

    /// A payload carrying only records, as produced by a meet-file importer.
    #[must_use]
    pub fn from_records(records: Vec<Value>) -> Self {
        Self {
            identities: Vec::new(),
            records,
        }
    }
}

/// An alias claimed by two different identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasConflict {
    /// The contested name.
    pub alias: String,
    /// Canonical name of the local owner, which keeps the alias.
    pub local_owner_canonical: String,
    /// Canonical name of the incoming identity that also claimed it.
    pub incoming_canonical: String,
}

/// Everything a reconciliation did, for the operator to review.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    /// Incoming identities that were new locally.
    pub identities_created: usize,
    /// Aliases attached to existing local identities.
    pub aliases_added: usize,
    /// Aliases left with their local owner.
    pub alias_conflicts: Vec<AliasConflict>,
    /// Records added.
    pub imported: usize,
    /// Local records replaced by a newer incoming copy.
    pub updated: usize,
    /// Records not applied: local copy as new or newer, or invalid.
    pub skipped: usize,
    /// One message per rejected record or identity.
    pub errors: Vec<String>,
    /// Near-duplicate identities after the merge.
    pub duplicates: Vec<DuplicateCandidate>,
}

/// A record from the incoming dataset that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRecord {
    /// Record id; a fresh one is generated when absent.
    pub id: Option<RecordId>,
    /// Subject as named by the incoming side.
    pub subject_name: String,
    /// Category tag.
    pub event: String,
    /// Distance in metres.
    pub distance: u32,
    /// Day of the performance.
    pub date: NaiveDate,
    /// Final time.
    pub time: RaceTime,
    /// Intermediate split times.
    pub splits: Vec<RaceTime>,
    /// Meet or session name.
    pub meet: Option<String>,
    /// Incoming edit time, if given.
    pub last_modified: Option<DateTime<Utc>>,
}

impl IncomingRecord {
    /// Validates one raw record.
    ///
    /// Required: `subjectName`, `event`, `distance`, `date`, `time`.
    /// Optional: `id`, `splits`, `meet`, `lastModified`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` naming the first missing or malformed field.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let fields = value.as_object().ok_or(ValidationError::NotAnObject)?;

        let id = optional_str(fields, "id")?
            .filter(|s| !s.trim().is_empty())
            .map(RecordId::from);
        let subject_name = required_str(fields, "subjectName")?;
        let event = required_str(fields, "event")?;

        let distance = match fields.get("distance") {
            None | Some(Value::Null) => return Err(ValidationError::missing("distance")),
            Some(v) => v
                .as_u64()
                .and_then(|d| u32::try_from(d).ok())
                .filter(|d| *d > 0)
                .ok_or_else(|| ValidationError::invalid("distance", "must be a positive integer"))?,
        };

        let date = required_str(fields, "date")?;
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| ValidationError::invalid("date", format!("expected YYYY-MM-DD: {e}")))?;

        let time = required_str(fields, "time")?;
        let time: RaceTime = time
            .parse()
            .map_err(|reason: String| ValidationError::invalid("time", reason))?;

        let splits = match fields.get("splits") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .ok_or_else(|| ValidationError::invalid("splits", "entries must be strings"))?
                        .parse::<RaceTime>()
                        .map_err(|reason| ValidationError::invalid("splits", reason))
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(ValidationError::invalid("splits", "must be an array")),
        };

        let meet = optional_str(fields, "meet")?;

        let last_modified = optional_str(fields, "lastModified")?
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| ValidationError::invalid("lastModified", format!("expected RFC 3339: {e}")))
            })
            .transpose()?;

        Ok(Self {
            id,
            subject_name,
            event,
            distance,
            date,
            time,
            splits,
            meet,
            last_modified,
        })
    }

    /// `last_modified`, or midnight UTC on the record's date when absent.
    #[must_use]
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.last_modified
            .unwrap_or_else(|| self.date.and_time(chrono::NaiveTime::MIN).and_utc())
    }

    fn into_record(self, id: RecordId, subject_name: String) -> PerformanceRecord {
        let last_modified = self.effective_timestamp();
        PerformanceRecord {
            id,
            subject_name,
            event: self.event,
            distance: self.distance,
            date: self.date,
            time: self.time,
            splits: self.splits,
            meet: self.meet,
            last_modified,
        }
    }
}

fn required_str(fields: &Map<String, Value>, key: &str) -> Result<String, ValidationError> {
    match fields.get(key) {
        None | Some(Value::Null) => Err(ValidationError::missing(key)),
        Some(Value::String(s)) if s.trim().is_empty() => Err(ValidationError::missing(key)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ValidationError::invalid(key, "must be a string")),
    }
}

fn optional_str(fields: &Map<String, Value>, key: &str) -> Result<Option<String>, ValidationError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::invalid(key, "must be a string")),
    }
}

/// Reconciles an incoming dataset into `store`.
///
/// The identity pass runs first because it may create identities the
/// record pass attributes records to. Afterwards the duplicate detector is
/// run at `duplicate_threshold` over the merged identities.
///
/// # Errors
///
/// Returns `ThresholdOutOfRange` for an invalid threshold, checked before
/// any mutation. Individual bad records never fail the call.
pub fn reconcile(
    store: &mut IdentityStore,
    payload: ReconciliationPayload,
    duplicate_threshold: f64,
) -> KyroidResult<ReconciliationResult> {
    let duplicate_threshold = validate_threshold(duplicate_threshold)?;
    let mut result = ReconciliationResult::default();

    for incoming in payload.identities {
        reconcile_identity(store, incoming, &mut result);
    }

    for (index, raw) in payload.records.iter().enumerate() {
        reconcile_record(store, index, raw, &mut result);
    }

    result.duplicates = find_duplicates(store, duplicate_threshold)?;

    info!(
        identities_created = result.identities_created,
        aliases_added = result.aliases_added,
        conflicts = result.alias_conflicts.len(),
        imported = result.imported,
        updated = result.updated,
        skipped = result.skipped,
        rejected = result.errors.len(),
        duplicates = result.duplicates.len(),
        "reconciliation finished"
    );
    Ok(result)
}

/// Identity pass for one incoming identity.
///
/// Every incoming alias is checked against every local name, whether or not
/// the incoming canonical name is already known locally, so an import can
/// never make one name resolve to two identities. An incoming canonical name
/// that is a local alias is folded into that alias's owner.
fn reconcile_identity(
    store: &mut IdentityStore,
    incoming: IncomingIdentity,
    result: &mut ReconciliationResult,
) {
    if incoming.canonical_name.trim().is_empty() {
        result
            .errors
            .push("identity: canonical name is empty".to_string());
        return;
    }

    let local = store
        .owner_of(&incoming.canonical_name)
        .map(|(identity, role)| (identity.id, identity.canonical_name.clone(), role));

    match local {
        Some((local_id, local_canonical, role)) => {
            if role == NameRole::Alias {
                warn!(
                    incoming = %incoming.canonical_name,
                    local = %local_canonical,
                    "incoming canonical name is a local alias; folding into its owner"
                );
            }
            for alias in &incoming.aliases {
                if alias.trim().is_empty() || *alias == local_canonical {
                    continue;
                }
                match store.owner_of(alias) {
                    Some((owner, _)) if owner.id == local_id => {}
                    Some((owner, _)) => {
                        record_conflict(result, alias, &owner.canonical_name, &incoming.canonical_name);
                    }
                    None => {
                        if store.add_alias(local_id, alias) {
                            result.aliases_added += 1;
                        }
                    }
                }
            }
        }
        None => {
            let mut accepted = Vec::with_capacity(incoming.aliases.len());
            for alias in &incoming.aliases {
                if alias.trim().is_empty() || *alias == incoming.canonical_name {
                    continue;
                }
                match store.owner_of(alias) {
                    Some((owner, _)) => {
                        let owner = owner.canonical_name.clone();
                        record_conflict(result, alias, &owner, &incoming.canonical_name);
                    }
                    None => accepted.push(alias.clone()),
                }
            }
            let identity = Identity::with_aliases(incoming.canonical_name, accepted);
            info!(name = %identity.canonical_name, aliases = identity.alias_count(), "imported identity");
            store.insert_identity(identity);
            result.identities_created += 1;
        }
    }
}

fn record_conflict(result: &mut ReconciliationResult, alias: &str, local_owner: &str, incoming: &str) {
    warn!(alias, local_owner, incoming, "alias conflict; keeping local owner");
    let conflict = AliasConflict {
        alias: alias.to_string(),
        local_owner_canonical: local_owner.to_string(),
        incoming_canonical: incoming.to_string(),
    };
    if !result.alias_conflicts.contains(&conflict) {
        result.alias_conflicts.push(conflict);
    }
}

/// Record pass for one raw incoming record.
fn reconcile_record(
    store: &mut IdentityStore,
    index: usize,
    raw: &Value,
    result: &mut ReconciliationResult,
) {
    let incoming = match IncomingRecord::from_value(raw) {
        Ok(incoming) => incoming,
        Err(e) => {
            warn!(index, error = %e, "rejected incoming record");
            result.skipped += 1;
            result.errors.push(format!("performanceRecords[{index}]: {e}"));
            return;
        }
    };

    let subject = match store.ensure_exists(&store.resolve(&incoming.subject_name)) {
        Ok(subject) => subject,
        Err(e) => {
            result.skipped += 1;
            result.errors.push(format!("performanceRecords[{index}]: {e}"));
            return;
        }
    };

    match incoming.id.clone() {
        Some(id) if store.record(&id).is_some() => {
            let local_stamp = store.record(&id).map(|r| r.last_modified);
            let incoming_stamp = incoming.effective_timestamp();
            if local_stamp.is_some_and(|local| incoming_stamp > local) {
                store.put_record(incoming.into_record(id, subject));
                result.updated += 1;
            } else {
                result.skipped += 1;
            }
        }
        Some(id) => {
            store.put_record(incoming.into_record(id, subject));
            result.imported += 1;
        }
        None => {
            store.put_record(incoming.into_record(RecordId::generate(), subject));
            result.imported += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record_json(id: &str, subject: &str, last_modified: &str) -> Value {
        json!({
            "id": id,
            "subjectName": subject,
            "event": "freestyle",
            "distance": 100,
            "date": "2024-06-01",
            "time": "59.87",
            "lastModified": last_modified,
        })
    }

    #[test]
    fn test_payload_rejects_non_objects() {
        assert!(ReconciliationPayload::from_json("[1, 2]").is_err());
        assert!(ReconciliationPayload::from_json("not json").is_err());
        assert!(ReconciliationPayload::from_json(r#"{"identities": {}}"#).is_err());
        assert!(ReconciliationPayload::from_json(r#"{"performanceRecords": 3}"#).is_err());
        assert!(ReconciliationPayload::from_json(r#"{"identities": [{"aliases": []}]}"#).is_err());
    }

    #[test]
    fn test_payload_sections_are_optional() {
        let payload = ReconciliationPayload::from_json("{}").unwrap();
        assert!(payload.identities.is_empty());
        assert!(payload.records.is_empty());
    }

    #[test]
    fn test_incoming_record_validation() {
        let ok = IncomingRecord::from_value(&record_json("r1", "Ann Lee", "2024-06-02T10:00:00Z")).unwrap();
        assert_eq!(ok.id, Some(RecordId::from("r1")));
        assert_eq!(ok.time.to_string(), "59.87");

        let missing = json!({"subjectName": "Ann Lee", "event": "free", "distance": 50, "time": "30.00"});
        assert_eq!(
            IncomingRecord::from_value(&missing),
            Err(ValidationError::missing("date"))
        );

        let bad_time = json!({
            "subjectName": "Ann Lee", "event": "free", "distance": 50,
            "date": "2024-01-01", "time": "fast"
        });
        assert!(matches!(
            IncomingRecord::from_value(&bad_time),
            Err(ValidationError::InvalidField { ref field, .. }) if field == "time"
        ));

        let zero_distance = json!({
            "subjectName": "Ann Lee", "event": "free", "distance": 0,
            "date": "2024-01-01", "time": "30.00"
        });
        assert!(IncomingRecord::from_value(&zero_distance).is_err());

        assert_eq!(IncomingRecord::from_value(&json!(42)), Err(ValidationError::NotAnObject));
    }

    #[test]
    fn test_effective_timestamp_falls_back_to_date() {
        let raw = json!({
            "subjectName": "Ann Lee", "event": "free", "distance": 50,
            "date": "2024-01-02", "time": "30.00"
        });
        let incoming = IncomingRecord::from_value(&raw).unwrap();
        assert_eq!(
            incoming.effective_timestamp().to_rfc3339(),
            "2024-01-02T00:00:00+00:00"
        );
    }

    #[test]
    fn test_new_identity_with_conflicting_alias_keeps_local_owner() {
        let mut store = IdentityStore::new();
        store.insert_identity(Identity::with_aliases("Ann Lee", ["A.Lee"]));

        let payload = ReconciliationPayload {
            identities: vec![IncomingIdentity::new("Annie Lee", ["A.Lee", "Annie L."])],
            records: Vec::new(),
        };
        let result = reconcile(&mut store, payload, 0.85).unwrap();

        assert_eq!(result.identities_created, 1);
        assert_eq!(result.alias_conflicts.len(), 1);
        assert_eq!(result.alias_conflicts[0].local_owner_canonical, "Ann Lee");
        assert_eq!(store.resolve("A.Lee"), "Ann Lee");
        assert_eq!(store.resolve("Annie L."), "Annie Lee");
        store.check_invariants().unwrap();
    }

    #[test]
    fn test_incoming_canonical_that_is_local_alias_folds_into_owner() {
        let mut store = IdentityStore::new();
        store.insert_identity(Identity::with_aliases("Ann Lee", ["Annie Lee"]));

        let payload = ReconciliationPayload {
            identities: vec![IncomingIdentity::new("Annie Lee", ["A. Lee"])],
            records: Vec::new(),
        };
        let result = reconcile(&mut store, payload, 0.85).unwrap();

        assert_eq!(result.identities_created, 0);
        assert_eq!(result.aliases_added, 1);
        assert_eq!(store.identity_count(), 1);
        assert_eq!(store.resolve("A. Lee"), "Ann Lee");
        store.check_invariants().unwrap();
    }

    #[test]
    fn test_record_recency_rules() {
        let mut store = IdentityStore::new();
        let seed = ReconciliationPayload::from_records(vec![
            record_json("r1", "Ann Lee", "2024-06-02T10:00:00Z"),
            record_json("r2", "Ann Lee", "2024-06-02T10:00:00Z"),
        ]);
        reconcile(&mut store, seed, 0.85).unwrap();

        let payload = ReconciliationPayload::from_records(vec![
            record_json("r1", "Ann Lee", "2024-06-03T10:00:00Z"),
            record_json("r2", "Ann Lee", "2024-06-02T10:00:00Z"),
            record_json("r3", "Ann Lee", "2024-06-01T10:00:00Z"),
        ]);
        let result = reconcile(&mut store, payload, 0.85).unwrap();

        assert_eq!(result.updated, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.imported, 1);
        assert_eq!(store.record_len(), 3);
    }

    #[test]
    fn test_bad_records_do_not_abort_batch() {
        let mut store = IdentityStore::new();
        let payload = ReconciliationPayload::from_records(vec![
            json!({"subjectName": "Ann Lee"}),
            json!("garbage"),
            record_json("r1", "Ann Lee", "2024-06-02T10:00:00Z"),
        ]);
        let result = reconcile(&mut store, payload, 0.85).unwrap();

        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped, 2);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].starts_with("performanceRecords[0]"));
    }

    #[test]
    fn test_records_without_id_get_fresh_ids() {
        let mut store = IdentityStore::new();
        let raw = json!({
            "subjectName": "Ann Lee", "event": "free", "distance": 50,
            "date": "2024-01-02", "time": "30.00"
        });
        let payload = ReconciliationPayload::from_records(vec![raw.clone(), raw]);
        let result = reconcile(&mut store, payload, 0.85).unwrap();
        assert_eq!(result.imported, 2);
        assert_eq!(store.record_len(), 2);
    }

    #[test]
    fn test_invalid_threshold_fails_before_mutation() {
        let mut store = IdentityStore::new();
        let payload = ReconciliationPayload {
            identities: vec![IncomingIdentity::new("Ann Lee", Vec::<String>::new())],
            records: Vec::new(),
        };
        assert!(reconcile(&mut store, payload, 2.0).is_err());
        assert_eq!(store.identity_count(), 0);
    }
}

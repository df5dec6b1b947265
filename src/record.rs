//! Performance records.
//!
//! A record references its subject by canonical name, not by identity id.
//! Every merge or rename therefore rewrites the affected records in bulk;
//! the cost is linear in the number of records.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Opaque performance record identifier.
///
/// Ids minted locally are UUID v4 strings; imported ids are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a fresh random record ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A formatted race duration, stored in hundredths of a second.
///
/// Accepts `SS`, `SS.f`, `SS.ff`, `M:SS.ff` and `H:MM:SS.ff`. The leading
/// component is unbounded; every following component must be below 60.
///
/// # Examples
///
/// ```
/// use kyroid::RaceTime;
///
/// let t: RaceTime = "1:02.34".parse().unwrap();
/// assert_eq!(t.hundredths(), 6234);
/// assert_eq!(t.to_string(), "1:02.34");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RaceTime(u64);

impl RaceTime {
    /// Creates a time from hundredths of a second.
    #[must_use]
    pub const fn from_hundredths(hundredths: u64) -> Self {
        Self(hundredths)
    }

    /// Returns the time in hundredths of a second.
    #[must_use]
    pub const fn hundredths(self) -> u64 {
        self.0
    }
}

impl FromStr for RaceTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("time cannot be empty".to_string());
        }

        let (clock, fraction) = match s.split_once('.') {
            Some((clock, fraction)) => (clock, Some(fraction)),
            None => (s, None),
        };

        let parts: Vec<&str> = clock.split(':').collect();
        if parts.len() > 3 {
            return Err(format!("too many ':' separated components in '{s}'"));
        }

        let mut seconds: u64 = 0;
        for (index, part) in parts.iter().enumerate() {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("'{part}' is not a number in '{s}'"));
            }
            let value: u64 = part
                .parse()
                .map_err(|e| format!("'{part}' is not a valid number: {e}"))?;
            if index > 0 && (value >= 60 || part.len() != 2) {
                return Err(format!("component '{part}' must be two digits below 60 in '{s}'"));
            }
            seconds = seconds
                .checked_mul(60)
                .and_then(|v| v.checked_add(value))
                .ok_or_else(|| format!("time '{s}' is too large"))?;
        }

        let hundredths = match fraction {
            None => 0,
            Some(f) if (1..=2).contains(&f.len()) && f.bytes().all(|b| b.is_ascii_digit()) => {
                let value: u64 = f
                    .parse()
                    .map_err(|e| format!("'{f}' is not a valid fraction: {e}"))?;
                if f.len() == 1 {
                    value * 10
                } else {
                    value
                }
            }
            Some(f) => return Err(format!("fraction '{f}' must be one or two digits in '{s}'")),
        };

        seconds
            .checked_mul(100)
            .and_then(|v| v.checked_add(hundredths))
            .map(Self)
            .ok_or_else(|| format!("time '{s}' is too large"))
    }
}

impl fmt::Display for RaceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hundredths = self.0 % 100;
        let total_seconds = self.0 / 100;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            write!(f, "{hours}:{minutes:02}:{seconds:02}.{hundredths:02}")
        } else if minutes > 0 {
            write!(f, "{minutes}:{seconds:02}.{hundredths:02}")
        } else {
            write!(f, "{seconds}.{hundredths:02}")
        }
    }
}

impl TryFrom<String> for RaceTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RaceTime> for String {
    fn from(value: RaceTime) -> Self {
        value.to_string()
    }
}

/// One timed performance of one individual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    /// Unique record id.
    pub id: RecordId,

    /// Always equal to some identity's current canonical name.
    pub subject_name: String,

    /// Category tag, e.g. `freestyle` or `100m hurdles`.
    pub event: String,

    /// Distance in metres.
    pub distance: u32,

    /// Day of the performance.
    pub date: NaiveDate,

    /// Final time.
    pub time: RaceTime,

    /// Intermediate split times, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub splits: Vec<RaceTime>,

    /// Meet or session name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meet: Option<String>,

    /// Last edit; orders copies of the record during reconciliation.
    pub last_modified: DateTime<Utc>,
}

impl PerformanceRecord {
    /// Builds a record from a new performance, stamped now.
    #[must_use]
    pub fn from_new(id: RecordId, subject_name: impl Into<String>, new: NewRecord) -> Self {
        Self {
            id,
            subject_name: subject_name.into(),
            event: new.event,
            distance: new.distance,
            date: new.date,
            time: new.time,
            splits: new.splits,
            meet: new.meet,
            last_modified: Utc::now(),
        }
    }

    /// True when both records describe the same event and distance.
    #[must_use]
    pub fn same_event(&self, other: &Self) -> bool {
        self.event == other.event && self.distance == other.distance
    }

    /// Orders by time, then by date (earlier first), then by id.
    #[must_use]
    pub fn cmp_by_time(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.date.cmp(&other.date))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// A performance to record, before its subject is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    /// Name as entered; resolved to a canonical name when recorded.
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
}

impl NewRecord {
    /// Creates a new record description without splits or meet.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the subject or event is empty or the
    /// distance is zero.
    pub fn new(
        subject_name: impl Into<String>,
        event: impl Into<String>,
        distance: u32,
        date: NaiveDate,
        time: RaceTime,
    ) -> Result<Self, ValidationError> {
        let subject_name = subject_name.into();
        let event = event.into();
        if subject_name.trim().is_empty() {
            return Err(ValidationError::missing("subjectName"));
        }
        if event.trim().is_empty() {
            return Err(ValidationError::missing("event"));
        }
        if distance == 0 {
            return Err(ValidationError::invalid("distance", "must be positive"));
        }
        Ok(Self {
            subject_name,
            event,
            distance,
            date,
            time,
            splits: Vec::new(),
            meet: None,
        })
    }

    /// Sets the split times.
    #[must_use]
    pub fn with_splits(mut self, splits: Vec<RaceTime>) -> Self {
        self.splits = splits;
        self
    }

    /// Sets the meet name.
    #[must_use]
    pub fn with_meet(mut self, meet: impl Into<String>) -> Self {
        self.meet = Some(meet.into());
        self
    }
}

/// An edit to an existing record. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordEdit {
    /// New subject; resolved before it is applied.
    pub subject_name: Option<String>,
    /// New category tag.
    pub event: Option<String>,
    /// New distance in metres.
    pub distance: Option<u32>,
    /// New date.
    pub date: Option<NaiveDate>,
    /// New final time.
    pub time: Option<RaceTime>,
    /// Replacement splits.
    pub splits: Option<Vec<RaceTime>>,
    /// `Some(None)` clears the meet.
    pub meet: Option<Option<String>>,
}

impl RecordEdit {
    /// Validates the fields that are set.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for empty names or a zero distance.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self
            .subject_name
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
        {
            return Err(ValidationError::invalid("subjectName", "cannot be empty"));
        }
        if self.event.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(ValidationError::invalid("event", "cannot be empty"));
        }
        if self.distance == Some(0) {
            return Err(ValidationError::invalid("distance", "must be positive"));
        }
        Ok(())
    }

    /// Applies every set field except the subject, which the store resolves.
    pub(crate) fn apply_attributes(self, record: &mut PerformanceRecord) {
        if let Some(event) = self.event {
            record.event = event;
        }
        if let Some(distance) = self.distance {
            record.distance = distance;
        }
        if let Some(date) = self.date {
            record.date = date;
        }
        if let Some(time) = self.time {
            record.time = time;
        }
        if let Some(splits) = self.splits {
            record.splits = splits;
        }
        if let Some(meet) = self.meet {
            record.meet = meet;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> RaceTime {
        s.parse().unwrap()
    }

    #[test]
    fn test_race_time_parses_supported_forms() {
        assert_eq!(t("59").hundredths(), 5900);
        assert_eq!(t("59.1").hundredths(), 5910);
        assert_eq!(t("59.12").hundredths(), 5912);
        assert_eq!(t("1:02.34").hundredths(), 6234);
        assert_eq!(t("1:00:00.00").hundredths(), 360_000);
        assert_eq!(t("75.40").hundredths(), 7540);
    }

    #[test]
    fn test_race_time_rejects_bad_forms() {
        for bad in ["", "abc", "1:2.00", "1:60.00", "1.234", "1::00", "1:00:00:00", "-3.00", "1.x"] {
            assert!(bad.parse::<RaceTime>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_race_time_display_is_canonical() {
        assert_eq!(t("59.1").to_string(), "59.10");
        assert_eq!(t("75.40").to_string(), "1:15.40");
        assert_eq!(t("1:02:03.04").to_string(), "1:02:03.04");
        assert_eq!(RaceTime::from_hundredths(5).to_string(), "0.05");
    }

    #[test]
    fn test_race_time_serializes_as_string() {
        let json = serde_json::to_string(&t("1:02.34")).unwrap();
        assert_eq!(json, "\"1:02.34\"");
        let back: RaceTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t("1:02.34"));
        assert!(serde_json::from_str::<RaceTime>("\"nope\"").is_err());
    }

    #[test]
    fn test_new_record_validation() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert!(NewRecord::new("Ann Lee", "freestyle", 100, date, t("59.00")).is_ok());
        assert_eq!(
            NewRecord::new(" ", "freestyle", 100, date, t("59.00")),
            Err(ValidationError::missing("subjectName"))
        );
        assert!(NewRecord::new("Ann Lee", "freestyle", 0, date, t("59.00")).is_err());
    }

    #[test]
    fn test_record_edit_applies_set_fields_only() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let new = NewRecord::new("Ann Lee", "freestyle", 100, date, t("59.00")).unwrap();
        let mut record = PerformanceRecord::from_new(RecordId::from("r1"), "Ann Lee", new);

        let edit = RecordEdit {
            time: Some(t("58.50")),
            meet: Some(Some("Spring Open".to_string())),
            ..RecordEdit::default()
        };
        edit.validate().unwrap();
        edit.apply_attributes(&mut record);

        assert_eq!(record.time, t("58.50"));
        assert_eq!(record.meet.as_deref(), Some("Spring Open"));
        assert_eq!(record.event, "freestyle");
        assert_eq!(record.distance, 100);
    }

    #[test]
    fn test_record_serialization_shape() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let new = NewRecord::new("Ann Lee", "freestyle", 100, date, t("59.00")).unwrap();
        let record = PerformanceRecord::from_new(RecordId::from("r1"), "Ann Lee", new);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["subjectName"], "Ann Lee");
        assert_eq!(json["date"], "2024-05-01");
        assert_eq!(json["time"], "59.00");
        assert!(json.get("splits").is_none());
        assert!(json.get("lastModified").is_some());
    }
}

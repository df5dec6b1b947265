//! Duplicate identity detection.
//!
//! Scores every unordered pair of canonical names, so the cost grows with
//! the square of the roster size. That is fine for one user's roster; there
//! is no incremental index.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ValidationError;
use crate::similarity::similarity;
use crate::store::IdentityStore;

/// Default minimum similarity for a pair to be reported.
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Two identities whose names look like the same individual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCandidate {
    /// First canonical name; sorts before `name_b`.
    pub name_a: String,
    /// Second canonical name.
    pub name_b: String,
    /// Similarity in `[0.0, 1.0]`.
    pub score: f64,
    /// Records labeled `name_a`.
    pub records_a: usize,
    /// Records labeled `name_b`.
    pub records_b: usize,
}

impl DuplicateCandidate {
    /// Returns true if this candidate pairs the two names, in either order.
    #[must_use]
    pub fn involves(&self, a: &str, b: &str) -> bool {
        (self.name_a == a && self.name_b == b) || (self.name_a == b && self.name_b == a)
    }
}

/// Validates a similarity threshold.
///
/// # Errors
///
/// Returns `ThresholdOutOfRange` unless `threshold` is finite and within
/// `[0.0, 1.0]`.
pub fn validate_threshold(threshold: f64) -> Result<f64, ValidationError> {
    if threshold.is_finite() && (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(ValidationError::ThresholdOutOfRange { value: threshold })
    }
}

/// Finds pairs of canonical names scoring at least `threshold`.
///
/// Results are sorted by descending score; equal scores are ordered by name
/// so output is stable.
///
/// # Errors
///
/// Returns `ThresholdOutOfRange` for an invalid threshold.
pub fn find_duplicates(
    store: &IdentityStore,
    threshold: f64,
) -> Result<Vec<DuplicateCandidate>, ValidationError> {
    let threshold = validate_threshold(threshold)?;
    let names = store.canonical_names();
    let counts = store.record_counts();
    let count = |name: &str| counts.get(name).copied().unwrap_or(0);

    let mut candidates = Vec::new();
    for (i, a) in names.iter().enumerate() {
        for b in &names[i + 1..] {
            let score = similarity(a, b);
            if score >= threshold {
                candidates.push(DuplicateCandidate {
                    name_a: (*a).to_string(),
                    name_b: (*b).to_string(),
                    score,
                    records_a: count(*a),
                    records_b: count(*b),
                });
            }
        }
    }

    candidates.sort_by(|x, y| {
        y.score
            .total_cmp(&x.score)
            .then_with(|| x.name_a.cmp(&y.name_a))
            .then_with(|| x.name_b.cmp(&y.name_b))
    });

    debug!(
        identities = names.len(),
        candidates = candidates.len(),
        threshold,
        "duplicate scan finished"
    );
    Ok(candidates)
}

//! Edit-distance name similarity.

use crate::normalize::{normalize, tokens};

/// Bonus added when two multi-token names share their first or last token.
pub const TOKEN_BONUS: f64 = 0.15;

/// Levenshtein distance over Unicode scalar values.
///
/// Unit cost for insert, delete and substitute; no transpositions.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Similarity of two raw names in `[0.0, 1.0]`.
///
/// Identical raw strings score `1.0`. Otherwise the score is one minus the
/// normalized edit distance, plus [`TOKEN_BONUS`] for a shared first token
/// and again for a shared last token when both names have at least two
/// tokens. The result is capped at `1.0` and symmetric in its arguments.
///
/// # Examples
///
/// ```
/// use kyroid::similarity;
///
/// assert_eq!(similarity("John Smith", "Jon Smith"), 1.0);
/// assert_eq!(similarity("Ann Lee", "Ann Lee"), 1.0);
/// ```
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let na = normalize(a);
    let nb = normalize(b);
    let max_len = na.chars().count().max(nb.chars().count());

    #[allow(clippy::cast_precision_loss)]
    let mut score = if max_len == 0 {
        1.0
    } else {
        1.0 - levenshtein(&na, &nb) as f64 / max_len as f64
    };

    let ta = tokens(&na);
    let tb = tokens(&nb);
    if ta.len() >= 2 && tb.len() >= 2 {
        if ta.first() == tb.first() {
            score = (score + TOKEN_BONUS).min(1.0);
        }
        if ta.last() == tb.last() {
            score = (score + TOKEN_BONUS).min(1.0);
        }
    }

    score
}

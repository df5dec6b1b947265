//! Name normalization for similarity scoring.
//!
//! Identity lookups never go through here: the store compares raw strings, so
//! `"ann lee"` and `"Ann Lee"` are different names that merely score as
//! similar.

use std::sync::OnceLock;

use regex::Regex;

static NON_WORD: OnceLock<Regex> = OnceLock::new();
static WHITESPACE_RUN: OnceLock<Regex> = OnceLock::new();

fn non_word() -> &'static Regex {
    NON_WORD.get_or_init(|| Regex::new(r"[^\w\s]").expect("static pattern is valid"))
}

fn whitespace_run() -> &'static Regex {
    WHITESPACE_RUN.get_or_init(|| Regex::new(r"\s+").expect("static pattern is valid"))
}

/// Canonicalizes a raw name for comparison.
///
/// Lowercases, trims, collapses whitespace runs to a single space, then
/// drops every character that is neither a word character nor whitespace.
/// Punctuation goes last, so a spaced-out mark leaves its spaces behind:
/// `"A . Lee"` becomes `"a  lee"`.
///
/// # Examples
///
/// ```
/// use kyroid::normalize;
///
/// assert_eq!(normalize("  O'Brien,   Pat "), "obrien pat");
/// assert_eq!(normalize("A.Lee"), "alee");
/// ```
#[must_use]
pub fn normalize(name: &str) -> String {
    let lowered = name.to_lowercase();
    let collapsed = whitespace_run().replace_all(lowered.trim(), " ");
    non_word().replace_all(&collapsed, "").into_owned()
}

/// Splits a normalized name on single spaces. Empty tokens are kept.
pub(crate) fn tokens(normalized: &str) -> Vec<&str> {
    normalized.split(' ').collect()
}

//! Identity types.
//!
//! An identity binds one canonical name to a set of aliases. Performance
//! records point at identities by canonical name, so the canonical name is
//! the label that shows up everywhere; aliases only exist to route other
//! spellings to it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique, stable identity identifier.
///
/// Once created, an `IdentityId` never changes, even when the identity's
/// canonical name is renamed.
///
/// # Examples
///
/// ```
/// use kyroid::IdentityId;
///
/// let id = IdentityId::new();
/// assert!(!id.is_nil());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(Uuid);

impl IdentityId {
    /// Creates a new random identity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identity ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for IdentityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for IdentityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// One individual, as far as the roster knows.
///
/// # Examples
///
/// ```
/// use kyroid::Identity;
///
/// let mut identity = Identity::new("Ann Lee");
/// identity.add_alias("A.Lee");
/// assert!(identity.has_alias("A.Lee"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Stable identifier; never reused.
    pub id: IdentityId,

    /// The name records are labeled with.
    pub canonical_name: String,

    /// Alternate spellings, in insertion order, without duplicates.
    #[serde(default)]
    pub aliases: Vec<String>,

    /// When the identity was created.
    pub created_at: DateTime<Utc>,

    /// Last time the name or alias set changed.
    pub updated_at: DateTime<Utc>,

    /// Bumped on every change, starting at 1.
    #[serde(default = "initial_version")]
    pub version: u64,
}

const fn initial_version() -> u64 {
    1
}

impl Identity {
    /// Creates a new identity with no aliases.
    #[must_use]
    pub fn new(canonical_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: IdentityId::new(),
            canonical_name: canonical_name.into(),
            aliases: Vec::new(),
            created_at: now,
            updated_at: now,
            version: initial_version(),
        }
    }

    /// Creates a new identity with an initial alias list.
    ///
    /// Duplicates and aliases equal to the canonical name are dropped.
    #[must_use]
    pub fn with_aliases<I, S>(canonical_name: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut identity = Self::new(canonical_name);
        for alias in aliases {
            let alias = alias.into();
            if alias != identity.canonical_name && !identity.aliases.contains(&alias) {
                identity.aliases.push(alias);
            }
        }
        identity
    }

    /// Adds an alias. Returns true if it was not already present.
    pub fn add_alias(&mut self, alias: impl Into<String>) -> bool {
        let alias = alias.into();
        if alias == self.canonical_name || self.aliases.contains(&alias) {
            return false;
        }
        self.aliases.push(alias);
        self.touch();
        true
    }

    /// Removes an alias. Returns true if it was present.
    pub fn remove_alias(&mut self, alias: &str) -> bool {
        let before = self.aliases.len();
        self.aliases.retain(|a| a != alias);
        let removed = self.aliases.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Returns true if `alias` is one of this identity's aliases.
    #[must_use]
    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.iter().any(|a| a == alias)
    }

    /// Canonical name followed by every alias.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical_name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Returns the number of aliases.
    #[must_use]
    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    /// Updates the `updated_at` timestamp and increments the version.
    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version = self.version.saturating_add(1);
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Identity {}

impl std::hash::Hash for Identity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

//! # Kyroid - Identity resolution and reconciliation for performance rosters
//!
//! Kyroid keeps one identity per individual even when their name is spelled
//! several ways across meets, imports and devices. Every name, canonical or
//! alias, resolves to exactly one identity, and every performance record is
//! labeled with its identity's canonical name.
//!
//! ## Core Concepts
//!
//! - **Identity**: A canonical name plus the aliases that route to it
//! - **Resolve**: Map any name to its canonical name; unknown names map to themselves
//! - **Merge / Unmerge**: Fold two identities together, or split an alias back out
//! - **Reconcile**: Import another roster without ever reassigning a local alias
//! - **Duplicates**: Score name pairs to suggest merges to an operator
//!
//! ## Usage
//!
//! ```rust
//! use kyroid::RosterEngine;
//!
//! let engine = RosterEngine::in_memory();
//! engine.ensure_exists("Robert Jones")?;
//! engine.ensure_exists("Bob Jones")?;
//! engine.merge("Bob Jones", "Robert Jones")?;
//!
//! assert_eq!(engine.resolve("Bob Jones")?, "Robert Jones");
//! assert_eq!(kyroid::normalize("  Bob   JONES! "), "bob jones");
//! # Ok::<(), kyroid::KyroidError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod identity;
pub mod record;
pub mod snapshot;

// Name matching
pub mod normalize;
pub mod similarity;

// Identity state and operations
pub mod duplicates;
pub mod reconcile;
pub mod store;

// Storage, configuration and the engine facade
pub mod config;
pub mod engine;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use config::EngineConfig;
pub use duplicates::{find_duplicates, DuplicateCandidate, DEFAULT_THRESHOLD};
pub use engine::RosterEngine;
pub use error::{
    ConfigError, IdentityError, KyroidError, KyroidResult, PayloadError, RecordError,
    SnapshotError, ValidationError,
};
pub use identity::{Identity, IdentityId};
pub use normalize::normalize;
pub use reconcile::{
    reconcile, AliasConflict, IncomingIdentity, ReconciliationPayload, ReconciliationResult,
};
pub use record::{NewRecord, PerformanceRecord, RaceTime, RecordEdit, RecordId};
pub use similarity::similarity;
pub use snapshot::Snapshot;
pub use storage::{InMemorySnapshotStore, SnapshotStore, StorageError};
pub use store::{IdentityStore, MergeOutcome, NameRole};

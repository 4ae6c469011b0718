//! forkstate core - pure kernel of the change-controlled entity store
//!
//! This crate holds everything that does not touch SQLite:
//! - Domain model (changes, change sets, commits, versions, state rows)
//! - Structured errors and the logging facility
//! - The per-session transaction stage
//! - The round clock issuing time-ordered ids
//! - Commit DAG ancestry and version inheritance walks
//! - Working set, materialization and diff kernels
//! - Snapshot validation against stored schemas

pub mod clock;
pub mod diff;
pub mod errors;
pub mod logging_facility;
pub mod materialize;
pub mod model;
pub mod stage;
pub mod traversal;
pub mod validation;
pub mod working_set;

// Used by the exported logging macros.
#[doc(hidden)]
pub use forkstate_core_types;

pub use clock::RoundClock;
pub use errors::{ExError, ExErrorKind, ExResult, Result, StateError};
pub use model::{
    Change, ChangeSet, ChangeSetElement, Commit, CommitEdge, EntityKey, StateRow, Version,
};
pub use stage::{Stage, StagedChange, StagedOp};

//! Domain types shared by the store, the engine and the pure kernels

pub mod change;
pub mod change_set;
pub mod commit;
pub mod entity;
pub mod label;
pub mod state;
pub mod version;

pub use change::{Change, ChangeFilter, StoredSchema};
pub use change_set::{ChangeSet, ChangeSetElement, NewChangeSet};
pub use commit::{AncestryOptions, Commit, CommitEdge};
pub use entity::{is_bookkeeping_schema, EntityKey};
pub use label::{EntityLabel, Label, CHECKPOINT_LABEL};
pub use state::{CacheEntry, EntityWrite, StateFilter, StateRow, WorkingChange};
pub use version::{NewVersion, Version, GLOBAL_VERSION_ID, MAIN_VERSION_ID};

/// Schema key of the `version` bookkeeping rows recorded in `global`
pub const SCHEMA_VERSION_ROW: &str = "forkstate_version";
/// Schema key of change set bookkeeping rows
pub const SCHEMA_CHANGE_SET_ROW: &str = "forkstate_change_set";
/// Schema key of commit bookkeeping rows
pub const SCHEMA_COMMIT_ROW: &str = "forkstate_commit";
/// Schema key of commit edge bookkeeping rows
pub const SCHEMA_COMMIT_EDGE_ROW: &str = "forkstate_commit_edge";

/// File id used by all bookkeeping rows
pub const BOOKKEEPING_FILE_ID: &str = "forkstate";
/// Plugin key used by all bookkeeping rows
pub const BOOKKEEPING_PLUGIN_KEY: &str = "forkstate";
/// Schema version stamped on bookkeeping rows
pub const BOOKKEEPING_SCHEMA_VERSION: &str = "1.0";

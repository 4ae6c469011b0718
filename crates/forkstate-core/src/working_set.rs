//! Working change set maintenance rule
//!
//! The working change set of a version holds, per entity key, the latest
//! change made since the last checkpoint. A deletion is only worth keeping
//! when the entity was visible at that checkpoint; deleting something that
//! was created and removed within the same working period leaves no trace.

/// What to do with the working element for one committed change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkingSetAction {
    /// Point the element for the key at this change
    Upsert,
    /// Drop the element for the key, if any
    Remove,
    /// Bookkeeping rows are not tracked in working sets
    Skip,
}

/// Decide the working set action for a committed change
///
/// `existed_at_checkpoint` is only consulted for deletions.
pub fn working_set_action(
    is_bookkeeping: bool,
    is_deletion: bool,
    existed_at_checkpoint: impl FnOnce() -> bool,
) -> WorkingSetAction {
    if is_bookkeeping {
        WorkingSetAction::Skip
    } else if !is_deletion || existed_at_checkpoint() {
        WorkingSetAction::Upsert
    } else {
        WorkingSetAction::Remove
    }
}

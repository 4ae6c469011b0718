//! Diff computation.
//!
//! Each side is the live-entity map of a materialized commit: entity key to
//! the id of the change defining its current content. Deleted entities are
//! simply absent from a side.

use std::collections::{BTreeMap, BTreeSet};

use crate::diff::model::{DiffEntry, StateDiff};
use crate::model::EntityKey;

/// Compare two live-entity maps
pub fn compute_state_diff(
    before_commit_id: &str,
    before: &BTreeMap<EntityKey, String>,
    after_commit_id: &str,
    after: &BTreeMap<EntityKey, String>,
) -> StateDiff {
    let mut diff = StateDiff {
        before_commit_id: before_commit_id.to_string(),
        after_commit_id: after_commit_id.to_string(),
        ..StateDiff::default()
    };

    let keys: BTreeSet<&EntityKey> = before.keys().chain(after.keys()).collect();
    for key in keys {
        let entry = DiffEntry {
            key: key.clone(),
            before_change_id: before.get(key).cloned(),
            after_change_id: after.get(key).cloned(),
        };
        match (&entry.before_change_id, &entry.after_change_id) {
            (None, Some(_)) => diff.added.push(entry),
            (Some(_), None) => diff.removed.push(entry),
            (Some(a), Some(b)) if a != b => diff.modified.push(entry),
            _ => {}
        }
    }
    diff
}

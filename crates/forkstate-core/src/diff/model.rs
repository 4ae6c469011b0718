//! Diff output types.
//!
//! Entries are sorted by entity key for deterministic serialization.

use serde::{Deserialize, Serialize};

use crate::model::EntityKey;

/// One entity that differs between the two sides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub key: EntityKey,
    /// Defining change on side A (`None` when absent or deleted there)
    pub before_change_id: Option<String>,
    /// Defining change on side B (`None` when absent or deleted there)
    pub after_change_id: Option<String>,
}

/// Structured diff between commit A and commit B
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDiff {
    pub before_commit_id: String,
    pub after_commit_id: String,
    /// Live in B, not in A
    pub added: Vec<DiffEntry>,
    /// Live on both sides with different defining changes
    pub modified: Vec<DiffEntry>,
    /// Live in A, not in B
    pub removed: Vec<DiffEntry>,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

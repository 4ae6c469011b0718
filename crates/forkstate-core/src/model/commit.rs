use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub change_set_id: String,
}

/// Append-only DAG edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitEdge {
    pub parent_id: String,
    pub child_id: String,
}

/// Options for ancestry queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AncestryOptions {
    /// Treat `a == b` as an ancestor relation
    pub include_self: bool,
    /// Upper bound on edge hops from the descendant; `None` is unbounded
    pub max_depth: Option<usize>,
}

impl AncestryOptions {
    pub fn including_self() -> Self {
        Self {
            include_self: true,
            max_depth: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

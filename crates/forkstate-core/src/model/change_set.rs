use serde::{Deserialize, Serialize};

use super::EntityKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub id: String,
    /// Once true, elements are frozen
    pub immutable: bool,
}

/// Reference from a change set to one change; unique per entity key in a set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetElement {
    pub change_set_id: String,
    pub change_id: String,
    pub entity_id: String,
    pub schema_key: String,
    pub file_id: String,
}

impl ChangeSetElement {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(&self.entity_id, &self.schema_key, &self.file_id)
    }
}

/// Request for an explicitly created change set
///
/// Elements are given by change id; their entity keys are taken from the
/// referenced changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewChangeSet {
    pub change_ids: Vec<String>,
    /// Commit ids; when non-empty the set is wrapped in a commit with one
    /// edge per parent
    pub parent_commit_ids: Vec<String>,
    /// Label names, created when missing
    pub labels: Vec<String>,
    pub immutable: bool,
}

impl NewChangeSet {
    pub fn with_changes<I, S>(change_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            change_ids: change_ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parent_commit_ids = parents.into_iter().map(Into::into).collect();
        self
    }

    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn immutable(mut self, immutable: bool) -> Self {
        self.immutable = immutable;
        self
    }
}

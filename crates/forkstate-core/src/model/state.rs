use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Change, EntityKey};

/// One resolved row of the state view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRow {
    pub entity_id: String,
    pub schema_key: String,
    pub file_id: String,
    pub version_id: String,
    pub plugin_key: String,
    pub snapshot_content: Value,
    pub schema_version: String,
    pub created_at: String,
    pub updated_at: String,
    /// Version the row was found in when it is not the requested one
    pub inherited_from_version_id: Option<String>,
    pub untracked: bool,
    /// `None` for untracked rows and rows still sitting in the stage
    pub change_id: Option<String>,
    pub commit_id: Option<String>,
}

impl StateRow {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(&self.entity_id, &self.schema_key, &self.file_id)
    }
}

/// Payload for an insert or update through the state view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityWrite {
    pub key: EntityKey,
    pub plugin_key: String,
    pub schema_version: String,
    pub snapshot_content: Value,
    /// Route to untracked storage instead of the stage
    #[serde(default)]
    pub untracked: bool,
}

impl EntityWrite {
    pub fn new(key: EntityKey, snapshot_content: Value) -> Self {
        Self {
            key,
            plugin_key: "default".to_string(),
            schema_version: "1.0".to_string(),
            snapshot_content,
            untracked: false,
        }
    }

    pub fn plugin_key(mut self, plugin_key: impl Into<String>) -> Self {
        self.plugin_key = plugin_key.into();
        self
    }

    pub fn schema_version(mut self, schema_version: impl Into<String>) -> Self {
        self.schema_version = schema_version.into();
        self
    }

    pub fn untracked(mut self) -> Self {
        self.untracked = true;
        self
    }
}

/// Narrowing for `select_state`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateFilter {
    pub version_id: String,
    pub schema_key: Option<String>,
    pub file_id: Option<String>,
    pub entity_id: Option<String>,
}

impl StateFilter {
    pub fn version(version_id: impl Into<String>) -> Self {
        Self {
            version_id: version_id.into(),
            schema_key: None,
            file_id: None,
            entity_id: None,
        }
    }

    pub fn schema(mut self, schema_key: impl Into<String>) -> Self {
        self.schema_key = Some(schema_key.into());
        self
    }

    pub fn file(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }

    pub fn entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn matches(&self, key: &EntityKey) -> bool {
        self.schema_key.as_ref().map_or(true, |s| *s == key.schema_key)
            && self.file_id.as_ref().map_or(true, |f| *f == key.file_id)
            && self.entity_id.as_ref().map_or(true, |e| *e == key.entity_id)
    }
}

/// A derived cache row owned by `version_id`
///
/// `snapshot_content == None` is a delete-mark that shadows inherited rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: EntityKey,
    pub version_id: String,
    pub plugin_key: String,
    pub schema_version: String,
    pub snapshot_content: Option<Value>,
    pub change_id: String,
    pub commit_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl CacheEntry {
    pub fn is_tombstone(&self) -> bool {
        self.snapshot_content.is_none()
    }

    /// Cache row for `change` as committed by `commit_id`
    pub fn from_change(change: &Change, version_id: &str, commit_id: &str) -> Self {
        Self {
            key: change.key(),
            version_id: version_id.to_string(),
            plugin_key: change.plugin_key.clone(),
            schema_version: change.schema_version.clone(),
            snapshot_content: change.snapshot_content.clone(),
            change_id: change.id.clone(),
            commit_id: commit_id.to_string(),
            created_at: change.created_at.clone(),
            updated_at: change.created_at.clone(),
        }
    }

    /// Project into the row view seen by a reader of `requested_version`
    ///
    /// Returns `None` for delete-marks.
    pub fn into_state_row(self, requested_version: &str) -> Option<StateRow> {
        let content = self.snapshot_content?;
        let inherited_from_version_id = if self.version_id == requested_version {
            None
        } else {
            Some(self.version_id)
        };
        Some(StateRow {
            entity_id: self.key.entity_id,
            schema_key: self.key.schema_key,
            file_id: self.key.file_id,
            version_id: requested_version.to_string(),
            plugin_key: self.plugin_key,
            snapshot_content: content,
            schema_version: self.schema_version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            inherited_from_version_id,
            untracked: false,
            change_id: Some(self.change_id),
            commit_id: Some(self.commit_id),
        })
    }
}

/// Pending-changes view entry: a working change set element joined with its change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingChange {
    pub change_set_id: String,
    pub change: Change,
}

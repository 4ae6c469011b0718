use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EntityKey;

/// One immutable entity mutation
///
/// `snapshot_content == None` marks a deletion. Ids are time-ordered, so
/// sorting by `id` approximates causal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    pub entity_id: String,
    pub schema_key: String,
    pub file_id: String,
    pub plugin_key: String,
    pub schema_version: String,
    pub snapshot_content: Option<Value>,
    /// RFC 3339; shared by every change of one commit round
    pub created_at: String,
}

impl Change {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(&self.entity_id, &self.schema_key, &self.file_id)
    }

    pub fn is_deletion(&self) -> bool {
        self.snapshot_content.is_none()
    }
}

/// Narrowing for change log listings; results are always ordered by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeFilter {
    pub entity: Option<EntityKey>,
    pub schema_key: Option<String>,
    pub file_id: Option<String>,
    pub limit: Option<usize>,
    /// Newest first instead of oldest first
    pub descending: bool,
}

impl ChangeFilter {
    pub fn for_entity(key: EntityKey) -> Self {
        Self {
            entity: Some(key),
            ..Self::default()
        }
    }

    pub fn for_schema(schema_key: impl Into<String>) -> Self {
        Self {
            schema_key: Some(schema_key.into()),
            ..Self::default()
        }
    }
}

/// A registered validation schema for `(schema_key, schema_version)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSchema {
    pub schema_key: String,
    pub schema_version: String,
    pub definition: Value,
}

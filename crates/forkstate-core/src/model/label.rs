use serde::{Deserialize, Serialize};

use super::EntityKey;

/// Built-in label attached to every sealed checkpoint change set
pub const CHECKPOINT_LABEL: &str = "checkpoint";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLabel {
    pub entity_id: String,
    pub schema_key: String,
    pub file_id: String,
    pub label_id: String,
}

impl EntityLabel {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(&self.entity_id, &self.schema_key, &self.file_id)
    }
}

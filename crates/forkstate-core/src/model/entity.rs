use serde::{Deserialize, Serialize};

use super::{SCHEMA_CHANGE_SET_ROW, SCHEMA_COMMIT_EDGE_ROW, SCHEMA_COMMIT_ROW, SCHEMA_VERSION_ROW};

/// Identity of an entity: unique per resolved version
///
/// Ordering is lexicographic over `(entity_id, schema_key, file_id)` so that
/// maps keyed by it iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_id: String,
    pub schema_key: String,
    pub file_id: String,
}

impl EntityKey {
    pub fn new(
        entity_id: impl Into<String>,
        schema_key: impl Into<String>,
        file_id: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            schema_key: schema_key.into(),
            file_id: file_id.into(),
        }
    }

    /// True when the key addresses internal bookkeeping state
    pub fn is_bookkeeping(&self) -> bool {
        is_bookkeeping_schema(&self.schema_key)
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}@{}", self.schema_key, self.entity_id, self.file_id)
    }
}

/// Bookkeeping schemas are excluded from working change set maintenance and
/// cannot be written through the state view.
pub fn is_bookkeeping_schema(schema_key: &str) -> bool {
    matches!(
        schema_key,
        SCHEMA_VERSION_ROW | SCHEMA_CHANGE_SET_ROW | SCHEMA_COMMIT_ROW | SCHEMA_COMMIT_EDGE_ROW
    )
}

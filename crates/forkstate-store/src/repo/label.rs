//! Labels and entity labels

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, Result};
use forkstate_core::model::{EntityKey, EntityLabel, Label};
use rusqlite::{Connection, OptionalExtension};

pub fn get_label_by_name(conn: &Connection, name: &str) -> Result<Option<Label>> {
    conn.query_row(
        "SELECT id, name FROM labels WHERE name = ?1",
        [name],
        |row| {
            Ok(Label {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(from_rusqlite)
}

/// Fetch the label called `name`, creating it with `new_id` when missing
pub fn ensure_label(conn: &Connection, name: &str, new_id: impl FnOnce() -> Result<String>) -> Result<Label> {
    if let Some(label) = get_label_by_name(conn, name)? {
        return Ok(label);
    }
    let label = Label {
        id: new_id()?,
        name: name.to_string(),
    };
    conn.execute(
        "INSERT INTO labels (id, name) VALUES (?1, ?2)",
        rusqlite::params![label.id, label.name],
    )
    .map_err(from_rusqlite)?;
    tracing::debug!(label = %label.name, "created label");
    Ok(label)
}

pub fn list_labels(conn: &Connection) -> Result<Vec<Label>> {
    let mut stmt = conn
        .prepare("SELECT id, name FROM labels ORDER BY name")
        .map_err(from_rusqlite)?;
    let labels = stmt
        .query_map([], |row| {
            Ok(Label {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(labels)
}

/// Attach a label to an entity; attaching twice is a no-op
pub fn attach_label(conn: &Connection, key: &EntityKey, label_id: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO entity_labels (entity_id, schema_key, file_id, label_id)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![key.entity_id, key.schema_key, key.file_id, label_id],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

pub fn labels_for_entity(conn: &Connection, key: &EntityKey) -> Result<Vec<Label>> {
    let mut stmt = conn
        .prepare(
            "SELECT l.id, l.name FROM entity_labels el JOIN labels l ON l.id = el.label_id
             WHERE el.entity_id = ?1 AND el.schema_key = ?2 AND el.file_id = ?3
             ORDER BY l.name",
        )
        .map_err(from_rusqlite)?;
    let labels = stmt
        .query_map(
            rusqlite::params![key.entity_id, key.schema_key, key.file_id],
            |row| {
                Ok(Label {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(labels)
}

pub fn list_entity_labels(conn: &Connection) -> Result<Vec<EntityLabel>> {
    let mut stmt = conn
        .prepare(
            "SELECT entity_id, schema_key, file_id, label_id FROM entity_labels
             ORDER BY label_id, schema_key, entity_id",
        )
        .map_err(from_rusqlite)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(EntityLabel {
                entity_id: row.get(0)?,
                schema_key: row.get(1)?,
                file_id: row.get(2)?,
                label_id: row.get(3)?,
            })
        })
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;

    #[test]
    fn test_ensure_is_idempotent() {
        let conn = memory_db();
        let a = ensure_label(&conn, "checkpoint", || Ok("l1".to_string())).unwrap();
        let b = ensure_label(&conn, "checkpoint", || Ok("l2".to_string())).unwrap();
        assert_eq!(a, b);
        assert_eq!(list_labels(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_attach_and_query() {
        let conn = memory_db();
        let label = ensure_label(&conn, "reviewed", || Ok("l1".to_string())).unwrap();
        let key = EntityKey::new("e1", "todo", "f1");
        attach_label(&conn, &key, &label.id).unwrap();
        attach_label(&conn, &key, &label.id).unwrap();

        assert_eq!(labels_for_entity(&conn, &key).unwrap(), vec![label]);
        assert_eq!(list_entity_labels(&conn).unwrap().len(), 1);
    }
}

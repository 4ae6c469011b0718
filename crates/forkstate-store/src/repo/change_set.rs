//! Change sets and their elements
//!
//! Immutability is checked here before writing so callers get a precise
//! domain error; the triggers in `003_immutability_triggers.sql` back it up
//! for any path that bypasses these functions.

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, Result};
use forkstate_core::errors::StateError;
use forkstate_core::model::{ChangeSet, ChangeSetElement, EntityKey};
use rusqlite::{Connection, OptionalExtension};

pub fn insert_change_set(conn: &Connection, change_set: &ChangeSet) -> Result<()> {
    conn.execute(
        "INSERT INTO change_sets (id, immutable) VALUES (?1, ?2)",
        rusqlite::params![change_set.id, change_set.immutable],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

pub fn get_change_set(conn: &Connection, change_set_id: &str) -> Result<Option<ChangeSet>> {
    conn.query_row(
        "SELECT id, immutable FROM change_sets WHERE id = ?1",
        [change_set_id],
        |row| {
            Ok(ChangeSet {
                id: row.get(0)?,
                immutable: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(from_rusqlite)
}

pub fn list_change_sets(conn: &Connection) -> Result<Vec<ChangeSet>> {
    let mut stmt = conn
        .prepare("SELECT id, immutable FROM change_sets ORDER BY id")
        .map_err(from_rusqlite)?;
    let sets = stmt
        .query_map([], |row| {
            Ok(ChangeSet {
                id: row.get(0)?,
                immutable: row.get(1)?,
            })
        })
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(sets)
}

fn require_mutable(conn: &Connection, change_set_id: &str) -> Result<()> {
    match get_change_set(conn, change_set_id)? {
        None => Err(StateError::ChangeSetNotFound {
            change_set_id: change_set_id.to_string(),
        }
        .into()),
        Some(cs) if cs.immutable => Err(StateError::ChangeSetImmutable {
            change_set_id: change_set_id.to_string(),
        }
        .into()),
        Some(_) => Ok(()),
    }
}

pub fn get_element(
    conn: &Connection,
    change_set_id: &str,
    key: &EntityKey,
) -> Result<Option<ChangeSetElement>> {
    conn.query_row(
        "SELECT change_set_id, change_id, entity_id, schema_key, file_id
         FROM change_set_elements
         WHERE change_set_id = ?1 AND entity_id = ?2 AND schema_key = ?3 AND file_id = ?4",
        rusqlite::params![change_set_id, key.entity_id, key.schema_key, key.file_id],
        element_from_row,
    )
    .optional()
    .map_err(from_rusqlite)
}

fn element_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChangeSetElement> {
    Ok(ChangeSetElement {
        change_set_id: row.get(0)?,
        change_id: row.get(1)?,
        entity_id: row.get(2)?,
        schema_key: row.get(3)?,
        file_id: row.get(4)?,
    })
}

/// Add a new element; the entity key must not already be in the set
pub fn insert_element(conn: &Connection, element: &ChangeSetElement) -> Result<()> {
    require_mutable(conn, &element.change_set_id)?;
    if get_element(conn, &element.change_set_id, &element.key())?.is_some() {
        return Err(StateError::DuplicateEntityInChangeSet {
            change_set_id: element.change_set_id.clone(),
            entity: element.key(),
        }
        .into());
    }
    conn.execute(
        "INSERT INTO change_set_elements (change_set_id, change_id, entity_id, schema_key, file_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            element.change_set_id,
            element.change_id,
            element.entity_id,
            element.schema_key,
            element.file_id
        ],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

/// Point the element for the key at `element.change_id`, adding it if absent
pub fn upsert_element(conn: &Connection, element: &ChangeSetElement) -> Result<()> {
    require_mutable(conn, &element.change_set_id)?;
    conn.execute(
        "INSERT INTO change_set_elements (change_set_id, change_id, entity_id, schema_key, file_id)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(change_set_id, entity_id, schema_key, file_id)
         DO UPDATE SET change_id = excluded.change_id",
        rusqlite::params![
            element.change_set_id,
            element.change_id,
            element.entity_id,
            element.schema_key,
            element.file_id
        ],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

/// Remove the element for a key; returns whether one existed
pub fn remove_element(conn: &Connection, change_set_id: &str, key: &EntityKey) -> Result<bool> {
    require_mutable(conn, change_set_id)?;
    let removed = conn
        .execute(
            "DELETE FROM change_set_elements
             WHERE change_set_id = ?1 AND entity_id = ?2 AND schema_key = ?3 AND file_id = ?4",
            rusqlite::params![change_set_id, key.entity_id, key.schema_key, key.file_id],
        )
        .map_err(from_rusqlite)?;
    Ok(removed > 0)
}

/// Elements of a set ordered by change id
pub fn list_elements(conn: &Connection, change_set_id: &str) -> Result<Vec<ChangeSetElement>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT change_set_id, change_id, entity_id, schema_key, file_id
             FROM change_set_elements WHERE change_set_id = ?1 ORDER BY change_id",
        )
        .map_err(from_rusqlite)?;
    let elements = stmt
        .query_map([change_set_id], element_from_row)
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(elements)
}

pub fn count_elements(conn: &Connection, change_set_id: &str) -> Result<usize> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM change_set_elements WHERE change_set_id = ?1",
            [change_set_id],
            |row| row.get(0),
        )
        .map_err(from_rusqlite)?;
    Ok(usize::try_from(n).unwrap_or_default())
}

/// Id of the version whose working commit uses this change set, if any
pub fn working_version_of(conn: &Connection, change_set_id: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT v.id FROM versions v JOIN commits c ON c.id = v.working_commit_id
         WHERE c.change_set_id = ?1 LIMIT 1",
        [change_set_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(from_rusqlite)
}

/// Freeze a change set's elements
///
/// Sealing is refused while the set backs some version's working commit;
/// checkpointing moves the version off the set before sealing it.
pub fn seal_change_set(conn: &Connection, change_set_id: &str) -> Result<()> {
    if get_change_set(conn, change_set_id)?.is_none() {
        return Err(StateError::ChangeSetNotFound {
            change_set_id: change_set_id.to_string(),
        }
        .into());
    }
    if let Some(version_id) = working_version_of(conn, change_set_id)? {
        return Err(StateError::SealWorkingChangeSet {
            change_set_id: change_set_id.to_string(),
            version_id,
        }
        .into());
    }
    conn.execute(
        "UPDATE change_sets SET immutable = 1 WHERE id = ?1 AND immutable = 0",
        [change_set_id],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

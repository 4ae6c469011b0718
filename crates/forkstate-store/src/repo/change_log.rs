//! Append-only change log
//!
//! Changes and their snapshots are only ever inserted. There is no update or
//! delete path here, and the schema's triggers reject both at the SQL level.

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, Result};
use forkstate_core::model::{Change, ChangeFilter};
use rusqlite::{Connection, OptionalExtension, Row, Transaction};

const CHANGE_COLUMNS: &str = "c.id, c.entity_id, c.schema_key, c.file_id, c.plugin_key,
     c.schema_version, s.content, c.created_at";

pub(crate) fn change_from_row(row: &Row<'_>) -> rusqlite::Result<Change> {
    Ok(Change {
        id: row.get(0)?,
        entity_id: row.get(1)?,
        schema_key: row.get(2)?,
        file_id: row.get(3)?,
        plugin_key: row.get(4)?,
        schema_version: row.get(5)?,
        snapshot_content: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Append a batch of changes inside the caller's transaction
///
/// Each non-deletion gets its own snapshot row (snapshot id = change id).
pub fn append_changes(tx: &Transaction<'_>, changes: &[Change]) -> Result<()> {
    let mut insert_snapshot = tx
        .prepare_cached("INSERT INTO snapshots (id, content) VALUES (?1, ?2)")
        .map_err(from_rusqlite)?;
    let mut insert_change = tx
        .prepare_cached(
            "INSERT INTO changes
                (id, entity_id, schema_key, file_id, plugin_key, schema_version, snapshot_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .map_err(from_rusqlite)?;

    for change in changes {
        let snapshot_id = match &change.snapshot_content {
            Some(content) => {
                insert_snapshot
                    .execute(rusqlite::params![change.id, content])
                    .map_err(from_rusqlite)?;
                Some(change.id.as_str())
            }
            None => None,
        };
        insert_change
            .execute(rusqlite::params![
                change.id,
                change.entity_id,
                change.schema_key,
                change.file_id,
                change.plugin_key,
                change.schema_version,
                snapshot_id,
                change.created_at,
            ])
            .map_err(from_rusqlite)?;
    }

    tracing::debug!(count = changes.len(), "appended changes");
    Ok(())
}

pub fn get_change(conn: &Connection, change_id: &str) -> Result<Option<Change>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM changes c LEFT JOIN snapshots s ON s.id = c.snapshot_id WHERE c.id = ?1",
            CHANGE_COLUMNS
        ),
        [change_id],
        change_from_row,
    )
    .optional()
    .map_err(from_rusqlite)
}

pub fn change_exists(conn: &Connection, change_id: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM changes WHERE id = ?1", [change_id], |_| Ok(()))
        .optional()
        .map_err(from_rusqlite)?;
    Ok(found.is_some())
}

/// List changes ordered by id
pub fn list_changes(conn: &Connection, filter: &ChangeFilter) -> Result<Vec<Change>> {
    let mut sql = format!(
        "SELECT {} FROM changes c LEFT JOIN snapshots s ON s.id = c.snapshot_id WHERE 1 = 1",
        CHANGE_COLUMNS
    );
    let mut params: Vec<String> = Vec::new();

    if let Some(key) = &filter.entity {
        params.push(key.entity_id.clone());
        sql.push_str(&format!(" AND c.entity_id = ?{}", params.len()));
        params.push(key.schema_key.clone());
        sql.push_str(&format!(" AND c.schema_key = ?{}", params.len()));
        params.push(key.file_id.clone());
        sql.push_str(&format!(" AND c.file_id = ?{}", params.len()));
    }
    if let Some(schema_key) = &filter.schema_key {
        params.push(schema_key.clone());
        sql.push_str(&format!(" AND c.schema_key = ?{}", params.len()));
    }
    if let Some(file_id) = &filter.file_id {
        params.push(file_id.clone());
        sql.push_str(&format!(" AND c.file_id = ?{}", params.len()));
    }
    sql.push_str(if filter.descending {
        " ORDER BY c.id DESC"
    } else {
        " ORDER BY c.id ASC"
    });
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let mut stmt = conn.prepare(&sql).map_err(from_rusqlite)?;
    let changes = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), change_from_row)
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(changes)
}

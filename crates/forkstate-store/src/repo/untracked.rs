//! Untracked state: version-scoped rows outside change control

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, Result};
use forkstate_core::model::{EntityKey, StateFilter, StateRow};
use rusqlite::{Connection, OptionalExtension, Row};

const UNTRACKED_COLUMNS: &str = "entity_id, schema_key, file_id, version_id, plugin_key,
     snapshot_content, schema_version, created_at, updated_at";

fn untracked_from_row(row: &Row<'_>) -> rusqlite::Result<StateRow> {
    Ok(StateRow {
        entity_id: row.get(0)?,
        schema_key: row.get(1)?,
        file_id: row.get(2)?,
        version_id: row.get(3)?,
        plugin_key: row.get(4)?,
        snapshot_content: row.get(5)?,
        schema_version: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        inherited_from_version_id: None,
        untracked: true,
        change_id: None,
        commit_id: None,
    })
}

pub fn get_untracked(conn: &Connection, key: &EntityKey, version_id: &str) -> Result<Option<StateRow>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM untracked_state
             WHERE entity_id = ?1 AND schema_key = ?2 AND file_id = ?3 AND version_id = ?4",
            UNTRACKED_COLUMNS
        ),
        rusqlite::params![key.entity_id, key.schema_key, key.file_id, version_id],
        untracked_from_row,
    )
    .optional()
    .map_err(from_rusqlite)
}

/// Insert or replace an untracked row, preserving `created_at` on replace
pub fn upsert_untracked(conn: &Connection, row: &StateRow) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO untracked_state ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(entity_id, schema_key, file_id, version_id) DO UPDATE SET
                plugin_key = excluded.plugin_key,
                snapshot_content = excluded.snapshot_content,
                schema_version = excluded.schema_version,
                updated_at = excluded.updated_at",
            UNTRACKED_COLUMNS
        ),
        rusqlite::params![
            row.entity_id,
            row.schema_key,
            row.file_id,
            row.version_id,
            row.plugin_key,
            row.snapshot_content,
            row.schema_version,
            row.created_at,
            row.updated_at
        ],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

pub fn delete_untracked(conn: &Connection, key: &EntityKey, version_id: &str) -> Result<bool> {
    let n = conn
        .execute(
            "DELETE FROM untracked_state
             WHERE entity_id = ?1 AND schema_key = ?2 AND file_id = ?3 AND version_id = ?4",
            rusqlite::params![key.entity_id, key.schema_key, key.file_id, version_id],
        )
        .map_err(from_rusqlite)?;
    Ok(n > 0)
}

/// Untracked rows of the filter's version
pub fn list_untracked(conn: &Connection, filter: &StateFilter) -> Result<Vec<StateRow>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM untracked_state WHERE version_id = ?1
             ORDER BY schema_key, file_id, entity_id",
            UNTRACKED_COLUMNS
        ))
        .map_err(from_rusqlite)?;
    let rows = stmt
        .query_map([&filter.version_id], untracked_from_row)
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(rows.into_iter().filter(|r| filter.matches(&r.key())).collect())
}

//! Derived state cache
//!
//! One physical table per schema key, registered in
//! `state_cache_partitions`. Rows belong to the version that owns them; a
//! row with `is_tombstone = 1` is a delete-mark shadowing inherited rows.
//! Nothing here is ground truth: any row may be dropped and rebuilt from
//! history.
//!
//! `state_cache_versions.complete` records whether a version's own rows are
//! all present. A miss in a complete version means "no own record"; a miss
//! in an incomplete one means "unknown, reconstruct".

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, Result};
use forkstate_core::model::{CacheEntry, Change, EntityKey, StateFilter};
use rusqlite::{Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};

const ENTRY_COLUMNS: &str = "entity_id, schema_key, file_id, version_id, plugin_key,
     schema_version, snapshot_content, change_id, commit_id, created_at, updated_at";

/// Physical table name for a schema key: sanitized prefix plus a short hash
/// so distinct keys never collide after sanitizing
pub fn partition_table_name(schema_key: &str) -> String {
    let sanitized: String = schema_key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .take(32)
        .collect();
    let digest = hex::encode(Sha256::digest(schema_key.as_bytes()));
    format!("state_cache_{}_{}", sanitized, &digest[..8])
}

pub fn partition_for(conn: &Connection, schema_key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT table_name FROM state_cache_partitions WHERE schema_key = ?1",
        [schema_key],
        |row| row.get(0),
    )
    .optional()
    .map_err(from_rusqlite)
}

/// Create and register the partition for `schema_key` if needed
pub fn ensure_partition(conn: &Connection, schema_key: &str) -> Result<String> {
    if let Some(table) = partition_for(conn, schema_key)? {
        return Ok(table);
    }
    let table = partition_table_name(schema_key);
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{t}\" (
            entity_id TEXT NOT NULL,
            schema_key TEXT NOT NULL,
            file_id TEXT NOT NULL,
            version_id TEXT NOT NULL,
            plugin_key TEXT NOT NULL,
            schema_version TEXT NOT NULL,
            snapshot_content TEXT,
            change_id TEXT NOT NULL,
            commit_id TEXT NOT NULL,
            inherited_from_version_id TEXT,
            is_tombstone INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (entity_id, file_id, version_id)
        );
        CREATE INDEX IF NOT EXISTS \"{t}_version\" ON \"{t}\"(version_id);",
        t = table
    ))
    .map_err(from_rusqlite)?;
    conn.execute(
        "INSERT OR IGNORE INTO state_cache_partitions (schema_key, table_name) VALUES (?1, ?2)",
        [schema_key, table.as_str()],
    )
    .map_err(from_rusqlite)?;
    tracing::debug!(schema_key, table = %table, "created cache partition");
    Ok(table)
}

/// `(schema_key, table_name)` of every partition
pub fn list_partitions(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn
        .prepare("SELECT schema_key, table_name FROM state_cache_partitions ORDER BY schema_key")
        .map_err(from_rusqlite)?;
    let parts = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(parts)
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<CacheEntry> {
    Ok(CacheEntry {
        key: EntityKey::new(
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ),
        version_id: row.get(3)?,
        plugin_key: row.get(4)?,
        schema_version: row.get(5)?,
        snapshot_content: row.get(6)?,
        change_id: row.get(7)?,
        commit_id: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// The version's own row for a key, live or delete-mark
pub fn get_entry(conn: &Connection, key: &EntityKey, version_id: &str) -> Result<Option<CacheEntry>> {
    let Some(table) = partition_for(conn, &key.schema_key)? else {
        return Ok(None);
    };
    conn.query_row(
        &format!(
            "SELECT {} FROM \"{}\" WHERE entity_id = ?1 AND file_id = ?2 AND version_id = ?3",
            ENTRY_COLUMNS, table
        ),
        rusqlite::params![key.entity_id, key.file_id, version_id],
        entry_from_row,
    )
    .optional()
    .map_err(from_rusqlite)
}

/// Idempotent write of one row; concurrent populators converge
pub fn upsert_entry(conn: &Connection, entry: &CacheEntry) -> Result<()> {
    let table = ensure_partition(conn, &entry.key.schema_key)?;
    conn.execute(
        &format!(
            "INSERT INTO \"{t}\" ({cols}, is_tombstone)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(entity_id, file_id, version_id) DO UPDATE SET
                plugin_key = excluded.plugin_key,
                schema_version = excluded.schema_version,
                snapshot_content = excluded.snapshot_content,
                change_id = excluded.change_id,
                commit_id = excluded.commit_id,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                is_tombstone = excluded.is_tombstone",
            t = table,
            cols = ENTRY_COLUMNS
        ),
        rusqlite::params![
            entry.key.entity_id,
            entry.key.schema_key,
            entry.key.file_id,
            entry.version_id,
            entry.plugin_key,
            entry.schema_version,
            entry.snapshot_content,
            entry.change_id,
            entry.commit_id,
            entry.created_at,
            entry.updated_at,
            entry.is_tombstone(),
        ],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

/// Fold a freshly committed change into the owning version's cache
///
/// Live rows keep their `created_at`. A missing row is only written when
/// the version's cache is complete; otherwise the read path rebuilds it
/// with the correct incarnation timestamps. Deletions always leave a
/// delete-mark.
pub fn apply_committed_change(
    conn: &Connection,
    change: &Change,
    version_id: &str,
    commit_id: &str,
) -> Result<()> {
    let mut entry = CacheEntry::from_change(change, version_id, commit_id);
    match get_entry(conn, &entry.key, version_id)? {
        Some(existing) if !existing.is_tombstone() && !change.is_deletion() => {
            entry.created_at = existing.created_at;
        }
        Some(_) => {}
        None if change.is_deletion() || is_complete(conn, version_id)? => {}
        None => return Ok(()),
    }
    upsert_entry(conn, &entry)
}

/// Remove one row; the version is marked incomplete
pub fn delete_entry(conn: &Connection, key: &EntityKey, version_id: &str) -> Result<bool> {
    let Some(table) = partition_for(conn, &key.schema_key)? else {
        return Ok(false);
    };
    let n = conn
        .execute(
            &format!(
                "DELETE FROM \"{}\" WHERE entity_id = ?1 AND file_id = ?2 AND version_id = ?3",
                table
            ),
            rusqlite::params![key.entity_id, key.file_id, version_id],
        )
        .map_err(from_rusqlite)?;
    set_complete(conn, version_id, false)?;
    Ok(n > 0)
}

/// Own rows (live and delete-marks) of the filter's version
///
/// Scans every partition unless the filter names a schema.
pub fn entries_for_version(conn: &Connection, filter: &StateFilter) -> Result<Vec<CacheEntry>> {
    let tables: Vec<String> = match &filter.schema_key {
        Some(schema_key) => partition_for(conn, schema_key)?.into_iter().collect(),
        None => list_partitions(conn)?.into_iter().map(|(_, t)| t).collect(),
    };

    let mut out = Vec::new();
    for table in tables {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM \"{}\" WHERE version_id = ?1 ORDER BY file_id, entity_id",
                ENTRY_COLUMNS, table
            ))
            .map_err(from_rusqlite)?;
        let rows = stmt
            .query_map([&filter.version_id], entry_from_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        out.extend(rows.into_iter().filter(|e| filter.matches(&e.key)));
    }
    Ok(out)
}

pub fn is_complete(conn: &Connection, version_id: &str) -> Result<bool> {
    let complete: Option<bool> = conn
        .query_row(
            "SELECT complete FROM state_cache_versions WHERE version_id = ?1",
            [version_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(from_rusqlite)?;
    Ok(complete.unwrap_or(false))
}

pub fn set_complete(conn: &Connection, version_id: &str, complete: bool) -> Result<()> {
    conn.execute(
        "INSERT INTO state_cache_versions (version_id, complete) VALUES (?1, ?2)
         ON CONFLICT(version_id) DO UPDATE SET complete = excluded.complete",
        rusqlite::params![version_id, complete],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

/// Drop every row of one version, or of all versions when `None`
pub fn drop_rows(conn: &Connection, version_id: Option<&str>) -> Result<usize> {
    let mut dropped = 0;
    for (_, table) in list_partitions(conn)? {
        dropped += match version_id {
            Some(v) => conn.execute(&format!("DELETE FROM \"{}\" WHERE version_id = ?1", table), [v]),
            None => conn.execute(&format!("DELETE FROM \"{}\"", table), []),
        }
        .map_err(from_rusqlite)?;
    }
    match version_id {
        Some(v) => set_complete(conn, v, false)?,
        None => {
            conn.execute("UPDATE state_cache_versions SET complete = 0", [])
                .map_err(from_rusqlite)?;
        }
    }
    tracing::debug!(?version_id, dropped, "dropped cache rows");
    Ok(dropped)
}

/// Copy `from`'s own rows to `to` (used when forking a version whose
/// history is identical to the source's)
pub fn copy_rows(conn: &Connection, from: &str, to: &str) -> Result<usize> {
    let mut copied = 0;
    for (_, table) in list_partitions(conn)? {
        copied += conn
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO \"{t}\" ({cols}, is_tombstone)
                     SELECT entity_id, schema_key, file_id, ?2, plugin_key, schema_version,
                            snapshot_content, change_id, commit_id, created_at, updated_at,
                            is_tombstone
                     FROM \"{t}\" WHERE version_id = ?1",
                    t = table,
                    cols = ENTRY_COLUMNS
                ),
                [from, to],
            )
            .map_err(from_rusqlite)?;
    }
    Ok(copied)
}

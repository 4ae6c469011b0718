//! Full reconstruction of entity state from commit history
//!
//! Gathers the change set elements of every commit reachable from a head and
//! hands them to the core `materialize` kernel. This is the ground truth the
//! state cache is checked against.

#![allow(clippy::result_large_err)]

use std::collections::BTreeMap;

use crate::errors::{from_rusqlite, Result};
use crate::repo::change_log::{change_from_row, get_change};
use crate::repo::commit_graph::SqliteEdges;
use forkstate_core::errors::{ExError, ExErrorKind};
use forkstate_core::materialize::{materialize, Materialized, ReachableElement};
use forkstate_core::model::{CacheEntry, Change, EntityKey};
use forkstate_core::traversal::ancestors;
use rusqlite::Connection;

/// Outcome of reconstructing one entity at a head
#[derive(Debug, Clone, PartialEq)]
pub enum Reconstructed {
    /// Live row as the version's cache would hold it
    Found(CacheEntry),
    /// Latest reachable change is a deletion; carries the delete-mark row
    Deleted(CacheEntry),
    /// No reachable change touches the key
    Absent,
}

/// Every element reachable from `head`, optionally narrowed to one key
pub fn reachable_elements(
    conn: &Connection,
    head: &str,
    key: Option<&EntityKey>,
) -> Result<Vec<ReachableElement>> {
    let reachable = ancestors(&SqliteEdges::new(conn), head)?;

    let sql = match key {
        Some(_) => {
            "SELECT e.entity_id, e.schema_key, e.file_id, e.change_id, c.snapshot_id IS NULL
             FROM commits k
             JOIN change_set_elements e ON e.change_set_id = k.change_set_id
             JOIN changes c ON c.id = e.change_id
             WHERE k.id = ?1 AND e.entity_id = ?2 AND e.schema_key = ?3 AND e.file_id = ?4"
        }
        None => {
            "SELECT e.entity_id, e.schema_key, e.file_id, e.change_id, c.snapshot_id IS NULL
             FROM commits k
             JOIN change_set_elements e ON e.change_set_id = k.change_set_id
             JOIN changes c ON c.id = e.change_id
             WHERE k.id = ?1"
        }
    };
    let mut stmt = conn.prepare_cached(sql).map_err(from_rusqlite)?;

    let mut out = Vec::new();
    for (commit_id, depth) in reachable {
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(ReachableElement {
                key: EntityKey::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ),
                change_id: row.get(3)?,
                is_deletion: row.get(4)?,
                commit_id: commit_id.clone(),
                depth,
            })
        };
        let rows = match key {
            Some(k) => stmt.query_map(
                rusqlite::params![commit_id, k.entity_id, k.schema_key, k.file_id],
                map_row,
            ),
            None => stmt.query_map([&commit_id], map_row),
        }
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
        out.extend(rows);
    }
    Ok(out)
}

/// Latest-change-wins state of every key reachable from `head`
pub fn materialize_all(conn: &Connection, head: &str) -> Result<BTreeMap<EntityKey, Materialized>> {
    Ok(materialize(reachable_elements(conn, head, None)?))
}

fn load_change(conn: &Connection, change_id: &str) -> Result<Change> {
    get_change(conn, change_id)?.ok_or_else(|| {
        ExError::new(ExErrorKind::Internal)
            .with_op("materialize")
            .with_message(format!("reachable change '{}' is missing from the log", change_id))
    })
}

fn to_entry(conn: &Connection, m: &Materialized, version_id: &str) -> Result<CacheEntry> {
    let latest = load_change(conn, &m.latest_change_id)?;
    let mut entry = CacheEntry::from_change(&latest, version_id, &m.commit_id);
    if !m.is_deletion && m.first_change_id != m.latest_change_id {
        entry.created_at = load_change(conn, &m.first_change_id)?.created_at;
    }
    Ok(entry)
}

/// Reconstruct one entity as the cache of `version_id` would hold it
pub fn materialize_entity(
    conn: &Connection,
    head: &str,
    key: &EntityKey,
    version_id: &str,
) -> Result<Reconstructed> {
    let states = materialize(reachable_elements(conn, head, Some(key))?);
    let Some(m) = states.get(key) else {
        return Ok(Reconstructed::Absent);
    };
    let entry = to_entry(conn, m, version_id)?;
    tracing::debug!(entity = %key, version_id, change_id = %m.latest_change_id, "reconstructed entity");
    if m.is_deletion {
        Ok(Reconstructed::Deleted(entry))
    } else {
        Ok(Reconstructed::Found(entry))
    }
}

/// Cache rows (live and delete-marks) for every key reachable from `head`
pub fn materialize_entries(conn: &Connection, head: &str, version_id: &str) -> Result<Vec<CacheEntry>> {
    materialize_all(conn, head)?
        .values()
        .map(|m| to_entry(conn, m, version_id))
        .collect()
}

/// Live keys at `head` with their latest change id
pub fn live_entities(conn: &Connection, head: &str) -> Result<BTreeMap<EntityKey, String>> {
    Ok(materialize_all(conn, head)?
        .into_iter()
        .filter(|(_, m)| !m.is_deletion)
        .map(|(k, m)| (k, m.latest_change_id))
        .collect())
}

/// Whether `key` is live in the history reachable from `head`
pub fn exists_at(conn: &Connection, head: &str, key: &EntityKey) -> Result<bool> {
    let states = materialize(reachable_elements(conn, head, Some(key))?);
    Ok(states.get(key).is_some_and(|m| !m.is_deletion))
}

/// Every change for `key` reachable from `head`, newest first
pub fn entity_history(conn: &Connection, head: &str, key: &EntityKey) -> Result<Vec<Change>> {
    let mut ids: Vec<String> = reachable_elements(conn, head, Some(key))?
        .into_iter()
        .map(|e| e.change_id)
        .collect();
    ids.sort();
    ids.dedup();

    let mut stmt = conn
        .prepare_cached(
            "SELECT c.id, c.entity_id, c.schema_key, c.file_id, c.plugin_key,
                    c.schema_version, s.content, c.created_at
             FROM changes c LEFT JOIN snapshots s ON s.id = c.snapshot_id
             WHERE c.id = ?1",
        )
        .map_err(from_rusqlite)?;
    let mut out = Vec::with_capacity(ids.len());
    for id in ids.iter().rev() {
        out.push(stmt.query_row([id], change_from_row).map_err(from_rusqlite)?);
    }
    Ok(out)
}

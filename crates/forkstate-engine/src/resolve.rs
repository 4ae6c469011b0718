//! Resolution layer: one row per entity key and version
//!
//! Precedence, highest first:
//!
//! 1. the session's stage for the requested version
//! 2. untracked rows of the requested version
//! 3. the requested version's cache, then each inherited version's cache,
//!    nearest first
//!
//! A cache miss in a version whose cache is incomplete reconstructs the row
//! from that version's history before moving on to its parent. A delete-mark
//! (cached or reconstructed) stops the walk.

#![allow(clippy::result_large_err)]

use std::collections::BTreeMap;

use forkstate_core::model::{CacheEntry, EntityKey, StateFilter, StateRow};
use forkstate_core::traversal::{inheritance_chain, resolve_through_chain, ChainLookup};
use forkstate_core::{Stage, StagedChange};
use forkstate_store::errors::{from_rusqlite, Result};
use forkstate_store::repo::materialize::{self, Reconstructed};
use forkstate_store::repo::version::SqliteVersionParents;
use forkstate_store::repo::{cache, key_value, untracked, version};
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Read-path knobs taken from `StoreConfig`
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReadOptions {
    /// Write reconstructed rows back into the cache
    pub read_through: bool,
    /// Round clock origin when deterministic
    pub deterministic_seed: Option<u64>,
}

impl ReadOptions {
    fn without_read_through(self) -> Self {
        Self {
            read_through: false,
            ..self
        }
    }
}

/// Run `f` inside a `BEGIN IMMEDIATE` transaction, or directly when the
/// connection is already inside one
///
/// Holding the write lock orders cache population against commits: the head
/// read inside `f` is the head every later commit builds on.
fn with_write_lock<T>(conn: &Connection, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    if !conn.is_autocommit() {
        return f(conn);
    }
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(from_rusqlite)?;
    let value = f(&tx)?;
    tx.commit().map_err(from_rusqlite)?;
    Ok(value)
}

fn reconstructed_lookup(reconstructed: Reconstructed) -> ChainLookup<CacheEntry> {
    match reconstructed {
        Reconstructed::Found(entry) => ChainLookup::Found(entry),
        Reconstructed::Deleted(_) => ChainLookup::Tombstone,
        Reconstructed::Absent => ChainLookup::Miss,
    }
}

/// Cached row, or `None` when the version's cache cannot answer
fn cached_lookup(
    conn: &Connection,
    key: &EntityKey,
    version_id: &str,
) -> Result<Option<ChainLookup<CacheEntry>>> {
    Ok(match cache::get_entry(conn, key, version_id)? {
        Some(entry) if entry.is_tombstone() => Some(ChainLookup::Tombstone),
        Some(entry) => Some(ChainLookup::Found(entry)),
        None if cache::is_complete(conn, version_id)? => Some(ChainLookup::Miss),
        None => None,
    })
}

fn reconstruct_entity(conn: &Connection, key: &EntityKey, version_id: &str) -> Result<Reconstructed> {
    let head = version::require_version(conn, version_id)?.commit_id;
    materialize::materialize_entity(conn, &head, key, version_id)
}

/// Reconstruct and store one row under the write lock
fn populate_entity(
    conn: &Connection,
    key: &EntityKey,
    version_id: &str,
) -> Result<ChainLookup<CacheEntry>> {
    with_write_lock(conn, |tx| {
        // a commit may have landed since the unlocked miss
        if let Some(found) = cached_lookup(tx, key, version_id)? {
            return Ok(found);
        }
        let reconstructed = reconstruct_entity(tx, key, version_id)?;
        match &reconstructed {
            Reconstructed::Found(entry) | Reconstructed::Deleted(entry) => {
                cache::upsert_entry(tx, entry)?;
            }
            Reconstructed::Absent => {}
        }
        Ok(reconstructed_lookup(reconstructed))
    })
}

/// Look up one version's own record for `key`
///
/// When storing the reconstructed row fails the read still answers, uncached.
fn lookup_own(
    conn: &Connection,
    options: ReadOptions,
    key: &EntityKey,
    version_id: &str,
) -> Result<ChainLookup<CacheEntry>> {
    if let Some(found) = cached_lookup(conn, key, version_id)? {
        return Ok(found);
    }
    if options.read_through {
        match populate_entity(conn, key, version_id) {
            Ok(found) => return Ok(found),
            Err(e) => tracing::warn!(
                version_id,
                entity_id = %key.entity_id,
                err_code = e.code(),
                "cache population failed; reading uncached"
            ),
        }
    }
    Ok(reconstructed_lookup(reconstruct_entity(conn, key, version_id)?))
}

/// Committed state of `key` as seen from `version_id`, inheritance included
pub(crate) fn resolve_committed(
    conn: &Connection,
    options: ReadOptions,
    key: &EntityKey,
    version_id: &str,
) -> Result<Option<StateRow>> {
    let chain = inheritance_chain(&SqliteVersionParents::new(conn), version_id)?;
    let found = resolve_through_chain(&chain, |v| lookup_own(conn, options, key, v))?;
    Ok(found.and_then(|(entry, _)| entry.into_state_row(version_id)))
}

/// Wall-clock timestamp in the format changes carry
fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Timestamp for rows outside history (staged and untracked)
///
/// Deterministic repositories use the timestamp the next round will carry.
pub(crate) fn row_timestamp(conn: &Connection, options: ReadOptions) -> Result<String> {
    match options.deterministic_seed {
        Some(seed) => Ok(key_value::begin_round(conn, Some(seed))?.timestamp()),
        None => Ok(now_timestamp()),
    }
}

fn staged_row(staged: &StagedChange, committed: Option<&StateRow>, now: &str) -> Option<StateRow> {
    let content = staged.snapshot_content.clone()?;
    Some(StateRow {
        entity_id: staged.key.entity_id.clone(),
        schema_key: staged.key.schema_key.clone(),
        file_id: staged.key.file_id.clone(),
        version_id: staged.version_id.clone(),
        plugin_key: staged.plugin_key.clone(),
        snapshot_content: content,
        schema_version: staged.schema_version.clone(),
        created_at: committed.map_or_else(|| now.to_string(), |r| r.created_at.clone()),
        updated_at: now.to_string(),
        inherited_from_version_id: None,
        untracked: false,
        change_id: None,
        commit_id: None,
    })
}

/// Committed tracked state of `key`, read without touching the cache
pub(crate) fn tracked_without_read_through(
    conn: &Connection,
    options: ReadOptions,
    key: &EntityKey,
    version_id: &str,
) -> Result<Option<StateRow>> {
    resolve_committed(conn, options.without_read_through(), key, version_id)
}

/// Full resolution of one key through every source
pub(crate) fn resolve_row(
    conn: &Connection,
    options: ReadOptions,
    stage: &Stage,
    key: &EntityKey,
    version_id: &str,
) -> Result<Option<StateRow>> {
    if let Some(staged) = stage.get(version_id, key) {
        let committed = if staged.is_deletion() {
            None
        } else {
            resolve_committed(conn, options, key, version_id)?
        };
        let now = row_timestamp(conn, options)?;
        return Ok(staged_row(staged, committed.as_ref(), &now));
    }
    if let Some(row) = untracked::get_untracked(conn, key, version_id)? {
        return Ok(Some(row));
    }
    resolve_committed(conn, options, key, version_id)
}

/// Own records (live and delete-marks) of one version
///
/// An incomplete cache is rebuilt from history. With read-through on, the
/// rebuild happens under the write lock, the rows are stored and the version
/// is marked complete; a failed store degrades to an uncached rebuild.
fn own_entries(
    conn: &Connection,
    options: ReadOptions,
    filter: &StateFilter,
) -> Result<Vec<CacheEntry>> {
    if cache::is_complete(conn, &filter.version_id)? {
        return cache::entries_for_version(conn, filter);
    }
    let version_id = filter.version_id.as_str();
    let entries = if options.read_through {
        let populated = with_write_lock(conn, |tx| {
            if cache::is_complete(tx, version_id)? {
                return cache::entries_for_version(tx, &StateFilter::version(version_id));
            }
            let head = version::require_version(tx, version_id)?.commit_id;
            let entries = materialize::materialize_entries(tx, &head, version_id)?;
            for entry in &entries {
                cache::upsert_entry(tx, entry)?;
            }
            cache::set_complete(tx, version_id, true)?;
            Ok(entries)
        });
        match populated {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    version_id,
                    err_code = e.code(),
                    "cache population failed; reading uncached"
                );
                rebuild_uncached(conn, version_id)?
            }
        }
    } else {
        rebuild_uncached(conn, version_id)?
    };
    Ok(entries
        .into_iter()
        .filter(|e| filter.matches(&e.key))
        .collect())
}

fn rebuild_uncached(conn: &Connection, version_id: &str) -> Result<Vec<CacheEntry>> {
    let head = version::require_version(conn, version_id)?.commit_id;
    materialize::materialize_entries(conn, &head, version_id)
}

/// Every resolved row of `filter.version_id`, ordered by entity key
///
/// Bookkeeping rows are only listed when the filter names their schema.
pub(crate) fn select_state(
    conn: &Connection,
    options: ReadOptions,
    stage: &Stage,
    filter: &StateFilter,
) -> Result<Vec<StateRow>> {
    let requested = filter.version_id.as_str();
    let include_bookkeeping = filter
        .schema_key
        .as_deref()
        .is_some_and(forkstate_core::model::is_bookkeeping_schema);

    // None = shadowed by a delete-mark or a staged deletion
    let mut rows: BTreeMap<EntityKey, Option<StateRow>> = BTreeMap::new();
    let chain = inheritance_chain(&SqliteVersionParents::new(conn), requested)?;
    for version_id in &chain {
        let scoped = StateFilter {
            version_id: version_id.clone(),
            ..filter.clone()
        };
        for entry in own_entries(conn, options, &scoped)? {
            let key = entry.key.clone();
            rows.entry(key)
                .or_insert_with(|| entry.into_state_row(requested));
        }
    }

    for row in untracked::list_untracked(conn, filter)? {
        rows.insert(row.key(), Some(row));
    }

    let now = row_timestamp(conn, options)?;
    for staged in stage.for_version(requested) {
        if !filter.matches(&staged.key) {
            continue;
        }
        let committed = rows.get(&staged.key).cloned().flatten();
        rows.insert(staged.key.clone(), staged_row(staged, committed.as_ref(), &now));
    }

    Ok(rows
        .into_iter()
        .filter(|(key, _)| include_bookkeeping || !key.is_bookkeeping())
        .filter_map(|(_, row)| row)
        .collect())
}

//! Version registry commands: creation, inheritance changes and the
//! reserved-version bootstrap

#![allow(clippy::result_large_err)]

use forkstate_core::errors::StateError;
use forkstate_core::model::{
    ChangeSet, Commit, NewVersion, Version, GLOBAL_VERSION_ID, MAIN_VERSION_ID, SCHEMA_VERSION_ROW,
};
use forkstate_core::traversal::would_close_cycle;
use forkstate_store::errors::Result;
use forkstate_store::repo::version::SqliteVersionParents;
use forkstate_store::repo::{cache, change_set, commit_graph, version};
use rusqlite::Transaction;

use crate::commands::commit::record_commit;
use crate::commands::round::Round;

/// Empty commit; `parent` gets one edge
fn empty_commit(
    tx: &Transaction<'_>,
    round: &mut Round,
    parent: Option<&str>,
    immutable: bool,
) -> Result<(ChangeSet, Commit)> {
    let set = ChangeSet {
        id: round.next_id()?,
        immutable: false,
    };
    change_set::insert_change_set(tx, &set)?;
    if immutable {
        change_set::seal_change_set(tx, &set.id)?;
    }
    let commit = Commit {
        id: round.next_id()?,
        change_set_id: set.id.clone(),
    };
    commit_graph::insert_commit(tx, &commit)?;
    if let Some(parent) = parent {
        commit_graph::insert_edge(tx, parent, &commit.id)?;
    }
    Ok((ChangeSet { immutable, ..set }, commit))
}

/// Create a version
///
/// With `from_version_id` the new version starts at the source's head (and
/// copies its cache rows when the source's cache is complete); without one it
/// starts at a fresh empty root commit. Either way it gets a fresh working
/// commit as child of its head.
pub(crate) fn create_version(
    tx: &Transaction<'_>,
    round: &mut Round,
    request: &NewVersion,
    id: Option<&str>,
) -> Result<Version> {
    if request.name.trim().is_empty() {
        return Err(StateError::InvalidInput {
            reason: "version name must not be empty".to_string(),
        }
        .into());
    }
    if let Some(parent) = &request.inherits_from_version_id {
        version::require_version(tx, parent)?;
    }

    let source = request
        .from_version_id
        .as_deref()
        .map(|v| version::require_version(tx, v))
        .transpose()?;

    let head = match &source {
        Some(src) => src.commit_id.clone(),
        None => {
            let (root_set, root) = empty_commit(tx, round, None, true)?;
            record_commit(round, &root_set, &root, &[])?;
            root.id
        }
    };
    let (working_set, working) = empty_commit(tx, round, Some(head.as_str()), false)?;
    record_commit(round, &working_set, &working, &[head.as_str()])?;

    let created = Version {
        id: match id {
            Some(id) => id.to_string(),
            None => round.next_id()?,
        },
        name: request.name.clone(),
        commit_id: head,
        working_commit_id: working.id,
        inherits_from_version_id: request.inherits_from_version_id.clone(),
    };
    version::insert_version(tx, &created)?;

    match &source {
        Some(src) if cache::is_complete(tx, &src.id)? => {
            let copied = cache::copy_rows(tx, &src.id, &created.id)?;
            cache::set_complete(tx, &created.id, true)?;
            tracing::debug!(version_id = %created.id, copied, "seeded cache from source version");
        }
        Some(_) => {}
        None => cache::set_complete(tx, &created.id, true)?,
    }

    round.record(SCHEMA_VERSION_ROW, &created.id, &created)?;
    Ok(created)
}

/// Re-point a version's inheritance, rejecting cycles
pub(crate) fn set_inheritance(
    tx: &Transaction<'_>,
    round: &mut Round,
    version_id: &str,
    inherits_from: Option<&str>,
) -> Result<Version> {
    let mut v = version::require_version(tx, version_id)?;
    if v.id == GLOBAL_VERSION_ID && inherits_from.is_some() {
        return Err(StateError::InvalidInput {
            reason: "global is the inheritance root".to_string(),
        }
        .into());
    }
    if let Some(parent) = inherits_from {
        version::require_version(tx, parent)?;
        if would_close_cycle(&SqliteVersionParents::new(tx), version_id, parent)? {
            return Err(StateError::InheritanceCycle {
                version_id: version_id.to_string(),
            }
            .into());
        }
    }
    version::set_inherits_from(tx, version_id, inherits_from)?;
    v.inherits_from_version_id = inherits_from.map(str::to_string);
    round.record(SCHEMA_VERSION_ROW, &v.id, &v)?;
    Ok(v)
}

/// Seed `global` and `main` on a fresh database; a no-op afterwards
///
/// Returns whether anything was created. Bootstrap rows are not recorded as
/// bookkeeping changes, so a fresh store has an empty history.
pub(crate) fn bootstrap(tx: &Transaction<'_>, round: &mut Round) -> Result<bool> {
    let mut created = false;
    if version::get_version(tx, GLOBAL_VERSION_ID)?.is_none() {
        create_version(tx, round, &NewVersion::named(GLOBAL_VERSION_ID), Some(GLOBAL_VERSION_ID))?;
        created = true;
    }
    if version::get_version(tx, MAIN_VERSION_ID)?.is_none() {
        create_version(
            tx,
            round,
            &NewVersion::named(MAIN_VERSION_ID).inheriting(GLOBAL_VERSION_ID),
            Some(MAIN_VERSION_ID),
        )?;
        created = true;
    }
    round.take_meta();
    Ok(created)
}

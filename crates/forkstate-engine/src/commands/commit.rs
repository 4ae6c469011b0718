//! Commit pipeline: stage → change set + commit → pointers → working set →
//! cache, one version at a time, `global` last
//!
//! Bookkeeping rows produced while committing other versions (the version
//! row, its change set, commit and edge) are queued on the round and land in
//! `global`'s commit of the same round. `global`'s own bookkeeping is not
//! recorded.

#![allow(clippy::result_large_err)]

use forkstate_core::errors::StateError;
use forkstate_core::model::{
    ChangeSet, ChangeSetElement, Commit, CommitEdge, GLOBAL_VERSION_ID,
    SCHEMA_CHANGE_SET_ROW, SCHEMA_COMMIT_EDGE_ROW, SCHEMA_COMMIT_ROW, SCHEMA_VERSION_ROW,
};
use forkstate_core::working_set::{working_set_action, WorkingSetAction};
use forkstate_core::{Stage, StagedChange};
use forkstate_store::errors::Result;
use forkstate_store::repo::{cache, change_set, commit_graph, materialize, untracked, version};
use rusqlite::Transaction;

use crate::commands::round::Round;
use crate::events::VersionCommit;

/// Entity id of a commit edge bookkeeping row
pub(crate) fn edge_entity_id(parent_id: &str, child_id: &str) -> String {
    format!("{}~{}", parent_id, child_id)
}

/// Queue the bookkeeping rows of a freshly created commit
pub(crate) fn record_commit(
    round: &mut Round,
    change_set: &ChangeSet,
    commit: &Commit,
    parents: &[&str],
) -> Result<()> {
    round.record(SCHEMA_CHANGE_SET_ROW, &change_set.id, change_set)?;
    round.record(SCHEMA_COMMIT_ROW, &commit.id, commit)?;
    for parent in parents {
        let edge = CommitEdge {
            parent_id: parent.to_string(),
            child_id: commit.id.clone(),
        };
        round.record(SCHEMA_COMMIT_EDGE_ROW, edge_entity_id(parent, &commit.id), &edge)?;
    }
    Ok(())
}

/// Flush a whole stage; the caller owns the transaction and the round
pub(crate) fn commit_stage(
    tx: &Transaction<'_>,
    round: &mut Round,
    stage: &Stage,
) -> Result<Vec<VersionCommit>> {
    let mut commits = Vec::new();
    let mut global = Vec::new();
    for (version_id, changes) in stage.grouped() {
        if version_id == GLOBAL_VERSION_ID {
            global = changes;
        } else {
            commits.push(commit_version(tx, round, &version_id, &changes)?);
        }
    }
    commits.extend(flush_global(tx, round, global)?);
    Ok(commits)
}

/// Commit `global`'s staged writes together with every queued bookkeeping row
pub(crate) fn flush_global(
    tx: &Transaction<'_>,
    round: &mut Round,
    mut staged: Vec<StagedChange>,
) -> Result<Option<VersionCommit>> {
    staged.extend(round.take_meta());
    if staged.is_empty() {
        return Ok(None);
    }
    Ok(Some(commit_version(tx, round, GLOBAL_VERSION_ID, &staged)?))
}

/// Create one commit for `version_id` holding `staged`
pub(crate) fn commit_version(
    tx: &Transaction<'_>,
    round: &mut Round,
    version_id: &str,
    staged: &[StagedChange],
) -> Result<VersionCommit> {
    let mut v = version::require_version(tx, version_id)?;
    let working = commit_graph::get_commit(tx, &v.working_commit_id)?.ok_or_else(|| {
        StateError::WorkingCommitMissing {
            version_id: version_id.to_string(),
            commit_id: v.working_commit_id.clone(),
        }
    })?;

    // untracked rows written by other sessions since staging
    for s in staged.iter().filter(|s| !s.key.is_bookkeeping()) {
        if untracked::get_untracked(tx, &s.key, version_id)?.is_some() {
            return Err(StateError::TrackingConflict {
                entity: s.key.clone(),
                version_id: version_id.to_string(),
                existing: "untracked",
            }
            .into());
        }
    }

    let changes = staged
        .iter()
        .map(|s| round.realize(s))
        .collect::<Result<Vec<_>>>()?;

    let change_set = ChangeSet {
        id: round.next_id()?,
        immutable: false,
    };
    change_set::insert_change_set(tx, &change_set)?;
    for change in &changes {
        change_set::insert_element(
            tx,
            &ChangeSetElement {
                change_set_id: change_set.id.clone(),
                change_id: change.id.clone(),
                entity_id: change.entity_id.clone(),
                schema_key: change.schema_key.clone(),
                file_id: change.file_id.clone(),
            },
        )?;
    }
    change_set::seal_change_set(tx, &change_set.id)?;

    let commit = Commit {
        id: round.next_id()?,
        change_set_id: change_set.id.clone(),
    };
    commit_graph::insert_commit(tx, &commit)?;
    commit_graph::insert_edge(tx, &v.commit_id, &commit.id)?;
    let previous_head = std::mem::replace(&mut v.commit_id, commit.id.clone());
    version::update_pointers(tx, version_id, &v.commit_id, &v.working_commit_id)?;

    // state as of the last checkpoint is the working commit's parent
    let checkpoint = commit_graph::commit_parents(tx, &working.id)?.into_iter().next();
    for change in &changes {
        let key = change.key();
        let existed = match &checkpoint {
            Some(head) if change.is_deletion() && !key.is_bookkeeping() => {
                materialize::exists_at(tx, head, &key)?
            }
            _ => false,
        };
        match working_set_action(key.is_bookkeeping(), change.is_deletion(), || existed) {
            WorkingSetAction::Upsert => change_set::upsert_element(
                tx,
                &ChangeSetElement {
                    change_set_id: working.change_set_id.clone(),
                    change_id: change.id.clone(),
                    entity_id: key.entity_id.clone(),
                    schema_key: key.schema_key.clone(),
                    file_id: key.file_id.clone(),
                },
            )?,
            WorkingSetAction::Remove => {
                change_set::remove_element(tx, &working.change_set_id, &key)?;
            }
            WorkingSetAction::Skip => {}
        }
        cache::apply_committed_change(tx, change, version_id, &commit.id)?;
    }

    if version_id != GLOBAL_VERSION_ID {
        round.record(SCHEMA_VERSION_ROW, &v.id, &v)?;
        let sealed = ChangeSet {
            immutable: true,
            ..change_set.clone()
        };
        record_commit(round, &sealed, &commit, &[previous_head.as_str()])?;
    }

    tracing::debug!(
        version_id,
        commit_id = %commit.id,
        change_count = changes.len(),
        "committed version group"
    );
    Ok(VersionCommit {
        version_id: version_id.to_string(),
        commit_id: commit.id,
        change_set_id: change_set.id,
    })
}

/// Wrap an existing change set in a new commit with one parent
pub(crate) fn create_commit(
    tx: &Transaction<'_>,
    round: &mut Round,
    change_set_id: &str,
    parent_commit_id: &str,
) -> Result<Commit> {
    let set = change_set::get_change_set(tx, change_set_id)?.ok_or_else(|| {
        StateError::ChangeSetNotFound {
            change_set_id: change_set_id.to_string(),
        }
    })?;
    commit_graph::require_commit(tx, parent_commit_id)?;
    let commit = Commit {
        id: round.next_id()?,
        change_set_id: set.id.clone(),
    };
    commit_graph::insert_commit(tx, &commit)?;
    commit_graph::insert_edge(tx, parent_commit_id, &commit.id)?;
    record_commit(round, &set, &commit, &[parent_commit_id])?;
    Ok(commit)
}

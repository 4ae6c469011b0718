//! Checkpointing a version's working commit
//!
//! ```text
//!   before:  head ─ ... ─ Cn          W (working, parent = last checkpoint)
//!   after:   Cn ──▶ W (sealed, label `checkpoint`, new head) ──▶ W' (working)
//! ```

#![allow(clippy::result_large_err)]

use forkstate_core::errors::StateError;
use forkstate_core::model::{
    ChangeSet, Commit, CommitEdge, EntityKey, BOOKKEEPING_FILE_ID, CHECKPOINT_LABEL,
    SCHEMA_CHANGE_SET_ROW, SCHEMA_COMMIT_EDGE_ROW, SCHEMA_VERSION_ROW,
};
use forkstate_store::errors::Result;
use forkstate_store::repo::{change_set, commit_graph, label, version};
use rusqlite::Transaction;

use crate::commands::commit::{edge_entity_id, record_commit};
use crate::commands::round::Round;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointOutcome {
    /// The version's head after the call
    pub commit_id: String,
    /// False when the working set was empty and nothing changed
    pub created: bool,
}

pub(crate) fn create_checkpoint(
    tx: &Transaction<'_>,
    round: &mut Round,
    version_id: &str,
) -> Result<CheckpointOutcome> {
    let mut v = version::require_version(tx, version_id)?;
    let working = commit_graph::get_commit(tx, &v.working_commit_id)?.ok_or_else(|| {
        StateError::WorkingCommitMissing {
            version_id: version_id.to_string(),
            commit_id: v.working_commit_id.clone(),
        }
    })?;

    if change_set::count_elements(tx, &working.change_set_id)? == 0 {
        return Ok(CheckpointOutcome {
            commit_id: v.commit_id,
            created: false,
        });
    }

    commit_graph::insert_edge(tx, &v.commit_id, &working.id)?;

    let next_set = ChangeSet {
        id: round.next_id()?,
        immutable: false,
    };
    change_set::insert_change_set(tx, &next_set)?;
    let next_working = Commit {
        id: round.next_id()?,
        change_set_id: next_set.id.clone(),
    };
    commit_graph::insert_commit(tx, &next_working)?;
    commit_graph::insert_edge(tx, &working.id, &next_working.id)?;

    let previous_head = std::mem::replace(&mut v.commit_id, working.id.clone());
    v.working_commit_id = next_working.id.clone();
    version::update_pointers(tx, version_id, &v.commit_id, &v.working_commit_id)?;

    // the version no longer points at the set, so sealing is allowed now
    change_set::seal_change_set(tx, &working.change_set_id)?;
    let checkpoint_label = label::ensure_label(tx, CHECKPOINT_LABEL, || round.next_id())?;
    label::attach_label(
        tx,
        &EntityKey::new(&working.change_set_id, SCHEMA_CHANGE_SET_ROW, BOOKKEEPING_FILE_ID),
        &checkpoint_label.id,
    )?;

    round.record(SCHEMA_VERSION_ROW, &v.id, &v)?;
    let sealed = ChangeSet {
        id: working.change_set_id.clone(),
        immutable: true,
    };
    round.record(SCHEMA_CHANGE_SET_ROW, &sealed.id, &sealed)?;
    let edge = CommitEdge {
        parent_id: previous_head.clone(),
        child_id: working.id.clone(),
    };
    round.record(
        SCHEMA_COMMIT_EDGE_ROW,
        edge_entity_id(&previous_head, &working.id),
        &edge,
    )?;
    record_commit(round, &next_set, &next_working, &[working.id.as_str()])?;

    tracing::debug!(version_id, checkpoint = %working.id, "sealed working commit");
    Ok(CheckpointOutcome {
        commit_id: working.id,
        created: true,
    })
}

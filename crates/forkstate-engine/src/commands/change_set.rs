//! Explicit change set creation and element editing

#![allow(clippy::result_large_err)]

use forkstate_core::errors::StateError;
use forkstate_core::model::{
    ChangeSet, ChangeSetElement, Commit, EntityKey, NewChangeSet, BOOKKEEPING_FILE_ID,
    SCHEMA_CHANGE_SET_ROW,
};
use forkstate_store::errors::Result;
use forkstate_store::repo::{change_log, change_set, commit_graph, label};
use rusqlite::Transaction;

use crate::commands::commit::record_commit;
use crate::commands::round::Round;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedChangeSet {
    pub change_set: ChangeSet,
    /// Commit wrapping the set, when parents were given
    pub commit_id: Option<String>,
}

fn element_for(tx: &Transaction<'_>, change_set_id: &str, change_id: &str) -> Result<ChangeSetElement> {
    let change = change_log::get_change(tx, change_id)?.ok_or_else(|| StateError::ChangeNotFound {
        change_id: change_id.to_string(),
    })?;
    Ok(ChangeSetElement {
        change_set_id: change_set_id.to_string(),
        change_id: change.id,
        entity_id: change.entity_id,
        schema_key: change.schema_key,
        file_id: change.file_id,
    })
}

pub(crate) fn create_change_set(
    tx: &Transaction<'_>,
    round: &mut Round,
    request: &NewChangeSet,
) -> Result<CreatedChangeSet> {
    let mut set = ChangeSet {
        id: round.next_id()?,
        immutable: false,
    };
    // sealed only after the elements are in
    change_set::insert_change_set(tx, &set)?;
    for change_id in &request.change_ids {
        change_set::insert_element(tx, &element_for(tx, &set.id, change_id)?)?;
    }

    let mut commit_id = None;
    if !request.parent_commit_ids.is_empty() {
        let commit = Commit {
            id: round.next_id()?,
            change_set_id: set.id.clone(),
        };
        commit_graph::insert_commit(tx, &commit)?;
        for parent in &request.parent_commit_ids {
            commit_graph::insert_edge(tx, parent, &commit.id)?;
        }
        commit_id = Some(commit);
    }

    let set_key = EntityKey::new(&set.id, SCHEMA_CHANGE_SET_ROW, BOOKKEEPING_FILE_ID);
    for name in &request.labels {
        if name.trim().is_empty() {
            return Err(StateError::InvalidInput {
                reason: "label name must not be empty".to_string(),
            }
            .into());
        }
        let l = label::ensure_label(tx, name, || round.next_id())?;
        label::attach_label(tx, &set_key, &l.id)?;
    }

    if request.immutable {
        change_set::seal_change_set(tx, &set.id)?;
        set.immutable = true;
    }

    match &commit_id {
        Some(commit) => {
            let parents: Vec<&str> = request.parent_commit_ids.iter().map(String::as_str).collect();
            record_commit(round, &set, commit, &parents)?;
        }
        None => round.record(SCHEMA_CHANGE_SET_ROW, &set.id, &set)?,
    }

    Ok(CreatedChangeSet {
        change_set: set,
        commit_id: commit_id.map(|c| c.id),
    })
}

/// Add elements by change id; keys already present in the set are rejected
pub(crate) fn add_elements(tx: &Transaction<'_>, change_set_id: &str, change_ids: &[String]) -> Result<()> {
    if change_set::get_change_set(tx, change_set_id)?.is_none() {
        return Err(StateError::ChangeSetNotFound {
            change_set_id: change_set_id.to_string(),
        }
        .into());
    }
    for change_id in change_ids {
        change_set::insert_element(tx, &element_for(tx, change_set_id, change_id)?)?;
    }
    Ok(())
}

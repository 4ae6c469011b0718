//! Sessions: one owned connection plus one transaction stage
//!
//! Writes against the state view (`insert`, `update`, `delete`) land in the
//! session's stage and stay invisible to other sessions until `commit`.
//! Untracked writes bypass the stage and are durable immediately.
//!
//! Every mutating round runs under the repository's commit lock inside a
//! `BEGIN IMMEDIATE` transaction; a failing step rolls the whole round back
//! and leaves the stage untouched.

#![allow(clippy::result_large_err)]

use forkstate_core::diff::engine::compute_state_diff;
use forkstate_core::diff::model::StateDiff;
use forkstate_core::errors::StateError;
use forkstate_core::model::{
    AncestryOptions, Change, ChangeFilter, ChangeSet, ChangeSetElement, Commit, CommitEdge,
    EntityKey, EntityLabel, EntityWrite, Label, NewChangeSet, NewVersion, StateFilter, StateRow,
    StoredSchema, Version, WorkingChange,
};
use forkstate_core::validation::validate_snapshot;
use forkstate_core::{log_op_end, log_op_error, log_op_start};
use forkstate_core::{Stage, StagedChange, StagedOp};
use forkstate_core_types::{RequestId, SessionId};
use forkstate_store::errors::{from_rusqlite, Result};
use forkstate_store::repo::{
    cache, change_log, change_set, commit_graph, key_value, label, materialize, schema,
    untracked, version,
};
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::commands::change_set::{add_elements, create_change_set, CreatedChangeSet};
use crate::commands::checkpoint::{create_checkpoint, CheckpointOutcome};
use crate::commands::commit::{commit_stage, create_commit, flush_global};
use crate::commands::round::Round;
use crate::commands::version::{create_version, set_inheritance};
use crate::events::{CommitEvent, VersionCommit};
use crate::repository::Repository;
use crate::resolve::{self, row_timestamp, ReadOptions};

pub struct Session {
    repo: Repository,
    conn: Connection,
    stage: Stage,
    id: SessionId,
}

/// Run `f` with start/end/error lifecycle events for `op`
fn logged<T>(op: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    log_op_start!(op);
    let start = std::time::Instant::now();

    let result = f().map_err(|e| {
        log_op_error!(op, e.clone(), duration_ms = start.elapsed().as_millis() as u64);
        e
    })?;

    log_op_end!(op, duration_ms = start.elapsed().as_millis() as u64);
    Ok(result)
}

/// One immediate transaction without a round (no ids, no history)
fn run_tx<T>(conn: &mut Connection, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(from_rusqlite)?;
    let value = f(&tx)?;
    tx.commit().map_err(from_rusqlite)?;
    Ok(value)
}

/// One mutating round: lock, transaction, round, `global` flush, sequence
/// advance, commit, notification
///
/// Errors carry the round's request id.
fn run_round<T>(
    repo: &Repository,
    conn: &mut Connection,
    session_id: &SessionId,
    f: impl FnOnce(&Transaction<'_>, &mut Round) -> Result<(T, Vec<VersionCommit>)>,
) -> Result<(T, CommitEvent)> {
    let request_id = RequestId::new();
    let _guard = repo.lock_commits()?;
    let (value, event) = apply_round(repo, conn, session_id, f)
        .map_err(|e| e.with_request_id(request_id.clone()))?;

    tracing::debug!(
        request_id = request_id.as_str(),
        round = event.round,
        commits = event.commits.len(),
        "round committed"
    );
    if !event.is_empty() {
        repo.notify(&event);
    }
    Ok((value, event))
}

fn apply_round<T>(
    repo: &Repository,
    conn: &mut Connection,
    session_id: &SessionId,
    f: impl FnOnce(&Transaction<'_>, &mut Round) -> Result<(T, Vec<VersionCommit>)>,
) -> Result<(T, CommitEvent)> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(from_rusqlite)?;
    let mut round = Round::begin(&tx, repo.config().deterministic_seed())?;

    let (value, mut commits) = f(&tx, &mut round)?;
    commits.extend(flush_global(&tx, &mut round, Vec::new())?);

    let (sequence, changes) = if round.is_idle() {
        (key_value::round_sequence(&tx)?, Vec::new())
    } else {
        round.finish(&tx)?
    };
    tx.commit().map_err(from_rusqlite)?;

    Ok((
        value,
        CommitEvent {
            round: sequence,
            session_id: session_id.clone(),
            commits,
            changes,
        },
    ))
}

fn check_key(key: &EntityKey) -> Result<()> {
    if key.is_bookkeeping() {
        return Err(StateError::ReservedSchema {
            schema_key: key.schema_key.clone(),
        }
        .into());
    }
    for (field, value) in [
        ("entity_id", &key.entity_id),
        ("schema_key", &key.schema_key),
        ("file_id", &key.file_id),
    ] {
        if value.trim().is_empty() {
            return Err(StateError::InvalidInput {
                reason: format!("{} must not be empty", field),
            }
            .into());
        }
    }
    Ok(())
}

fn tracking_conflict(key: &EntityKey, version_id: &str, existing: &'static str) -> StateError {
    StateError::TrackingConflict {
        entity: key.clone(),
        version_id: version_id.to_string(),
        existing,
    }
}

fn not_found(key: &EntityKey, version_id: &str) -> StateError {
    StateError::EntityNotFound {
        entity: key.clone(),
        version_id: version_id.to_string(),
    }
}

fn untracked_row(version_id: &str, write: EntityWrite, now: String) -> StateRow {
    StateRow {
        entity_id: write.key.entity_id,
        schema_key: write.key.schema_key,
        file_id: write.key.file_id,
        version_id: version_id.to_string(),
        plugin_key: write.plugin_key,
        snapshot_content: write.snapshot_content,
        schema_version: write.schema_version,
        created_at: now.clone(),
        updated_at: now,
        inherited_from_version_id: None,
        untracked: true,
        change_id: None,
        commit_id: None,
    }
}

fn staged_write(version_id: &str, op: StagedOp, write: EntityWrite) -> StagedChange {
    StagedChange {
        version_id: version_id.to_string(),
        key: write.key,
        op,
        plugin_key: write.plugin_key,
        schema_version: write.schema_version,
        snapshot_content: Some(write.snapshot_content),
    }
}

impl Session {
    pub(crate) fn new(repo: Repository, conn: Connection) -> Self {
        let id = SessionId::new();
        tracing::debug!(session_id = %id, "session opened");
        Self {
            repo,
            conn,
            stage: Stage::new(),
            id,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Number of staged writes waiting for `commit`
    pub fn staged_count(&self) -> usize {
        self.stage.len()
    }

    fn read_options(&self) -> ReadOptions {
        ReadOptions {
            read_through: self.repo.config().cache_read_through,
            deterministic_seed: self.repo.config().deterministic_seed(),
        }
    }

    fn resolve(&self, key: &EntityKey, version_id: &str) -> Result<Option<StateRow>> {
        resolve::resolve_row(&self.conn, self.read_options(), &self.stage, key, version_id)
    }

    /// Key shape, version existence and snapshot validity
    fn check_write(&self, version_id: &str, write: &EntityWrite) -> Result<()> {
        check_key(&write.key)?;
        version::require_version(&self.conn, version_id)?;
        match schema::get_schema(&self.conn, &write.key.schema_key, &write.schema_version)? {
            Some(stored) => validate_snapshot(&stored, &write.snapshot_content)?,
            None if self.repo.config().strict_schemas => {
                return Err(StateError::UnknownSchema {
                    schema_key: write.key.schema_key.clone(),
                    schema_version: write.schema_version.clone(),
                }
                .into());
            }
            None => {}
        }
        Ok(())
    }

    // ===== State view writes =====

    /// Create an entity in `version_id`
    ///
    /// Tracked writes are staged; untracked ones are stored right away. An
    /// entity the version only inherits may be inserted, shadowing the
    /// inherited row.
    pub fn insert(&mut self, version_id: &str, write: EntityWrite) -> Result<()> {
        logged("insert", || self.insert_impl(version_id, write))
    }

    fn insert_impl(&mut self, version_id: &str, write: EntityWrite) -> Result<()> {
        self.check_write(version_id, &write)?;
        let existing = self.resolve(&write.key, version_id)?;

        if write.untracked {
            if let Some(row) = existing {
                return Err(if row.untracked {
                    StateError::EntityAlreadyExists {
                        entity: write.key.clone(),
                        version_id: version_id.to_string(),
                    }
                } else {
                    tracking_conflict(&write.key, version_id, "tracked")
                }
                .into());
            }
            let options = self.read_options();
            let row = untracked_row(version_id, write, row_timestamp(&self.conn, options)?);
            return run_tx(&mut self.conn, |tx| {
                // another session may have stored or committed the key meanwhile
                let key = row.key();
                if untracked::get_untracked(tx, &key, version_id)?.is_some() {
                    return Err(StateError::EntityAlreadyExists {
                        entity: key,
                        version_id: version_id.to_string(),
                    }
                    .into());
                }
                if resolve::tracked_without_read_through(tx, options, &key, version_id)?.is_some() {
                    return Err(tracking_conflict(&key, version_id, "tracked").into());
                }
                untracked::upsert_untracked(tx, &row)
            });
        }

        let op = match existing {
            Some(row) if row.untracked => {
                return Err(tracking_conflict(&write.key, version_id, "untracked").into());
            }
            Some(row) if row.inherited_from_version_id.is_none() => {
                return Err(StateError::EntityAlreadyExists {
                    entity: write.key.clone(),
                    version_id: version_id.to_string(),
                }
                .into());
            }
            // shadowing an inherited row must survive a later staged delete
            Some(_) => StagedOp::Update,
            None => StagedOp::Insert,
        };
        self.stage.stage(staged_write(version_id, op, write));
        Ok(())
    }

    /// Replace the content of an entity visible in `version_id`
    ///
    /// The write goes where the entity lives: untracked rows are rewritten in
    /// place, tracked ones staged. The `untracked` flag must agree.
    pub fn update(&mut self, version_id: &str, write: EntityWrite) -> Result<()> {
        logged("update", || self.update_impl(version_id, write))
    }

    fn update_impl(&mut self, version_id: &str, write: EntityWrite) -> Result<()> {
        self.check_write(version_id, &write)?;
        let existing = self
            .resolve(&write.key, version_id)?
            .ok_or_else(|| not_found(&write.key, version_id))?;

        match (existing.untracked, write.untracked) {
            (true, true) => {
                let now = row_timestamp(&self.conn, self.read_options())?;
                let row = untracked_row(version_id, write, now);
                run_tx(&mut self.conn, |tx| untracked::upsert_untracked(tx, &row))
            }
            (false, false) => {
                self.stage
                    .stage(staged_write(version_id, StagedOp::Update, write));
                Ok(())
            }
            (true, false) => Err(tracking_conflict(&write.key, version_id, "untracked").into()),
            (false, true) => Err(tracking_conflict(&write.key, version_id, "tracked").into()),
        }
    }

    /// Remove an entity visible in `version_id`
    ///
    /// Deleting an inherited entity stages a delete-mark that shadows it.
    pub fn delete(&mut self, version_id: &str, key: &EntityKey) -> Result<()> {
        logged("delete", || self.delete_impl(version_id, key))
    }

    fn delete_impl(&mut self, version_id: &str, key: &EntityKey) -> Result<()> {
        check_key(key)?;
        version::require_version(&self.conn, version_id)?;
        let existing = self
            .resolve(key, version_id)?
            .ok_or_else(|| not_found(key, version_id))?;

        if existing.untracked {
            run_tx(&mut self.conn, |tx| {
                untracked::delete_untracked(tx, key, version_id).map(|_| ())
            })
        } else {
            self.stage.stage(StagedChange {
                version_id: version_id.to_string(),
                key: key.clone(),
                op: StagedOp::Delete,
                plugin_key: existing.plugin_key,
                schema_version: existing.schema_version,
                snapshot_content: None,
            });
            Ok(())
        }
    }

    /// Drop every staged write; returns how many there were
    pub fn discard_staged(&mut self) -> usize {
        let n = self.stage.len();
        self.stage.clear();
        n
    }

    // ===== Rounds =====

    /// Turn the stage into commits, one per touched version and `global` last
    ///
    /// An empty stage commits nothing and reports the current round sequence.
    pub fn commit(&mut self) -> Result<CommitEvent> {
        log_op_start!("commit", staged = self.stage.len());
        let start = std::time::Instant::now();

        let result = self.commit_impl().map_err(|e| {
            log_op_error!(
                "commit",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "commit",
            duration_ms = start.elapsed().as_millis() as u64,
            round = result.round,
            change_count = result.changes.len()
        );
        Ok(result)
    }

    fn commit_impl(&mut self) -> Result<CommitEvent> {
        if self.stage.is_empty() {
            return Ok(CommitEvent {
                round: key_value::round_sequence(&self.conn)?,
                session_id: self.id.clone(),
                commits: Vec::new(),
                changes: Vec::new(),
            });
        }
        let stage = &self.stage;
        let ((), event) = run_round(&self.repo, &mut self.conn, &self.id, |tx, round| {
            Ok(((), commit_stage(tx, round, stage)?))
        })?;
        // only now: a failed round leaves the stage for resubmission
        self.stage.clear();
        Ok(event)
    }

    /// Seal the working commit of `version_id`; see [`CheckpointOutcome`]
    pub fn create_checkpoint(&mut self, version_id: &str) -> Result<CheckpointOutcome> {
        logged("create_checkpoint", || {
            let (outcome, _) = run_round(&self.repo, &mut self.conn, &self.id, |tx, round| {
                let outcome = create_checkpoint(tx, round, version_id)?;
                if version_id == forkstate_core::model::GLOBAL_VERSION_ID {
                    round.take_meta();
                }
                Ok((outcome, Vec::new()))
            })?;
            Ok(outcome)
        })
    }

    pub fn create_version(&mut self, request: &NewVersion) -> Result<Version> {
        logged("create_version", || {
            let (created, _) = run_round(&self.repo, &mut self.conn, &self.id, |tx, round| {
                Ok((create_version(tx, round, request, None)?, Vec::new()))
            })?;
            Ok(created)
        })
    }

    /// Re-point (or clear) the inheritance of a version
    pub fn set_version_inheritance(
        &mut self,
        version_id: &str,
        inherits_from: Option<&str>,
    ) -> Result<Version> {
        logged("set_version_inheritance", || {
            let (v, _) = run_round(&self.repo, &mut self.conn, &self.id, |tx, round| {
                Ok((set_inheritance(tx, round, version_id, inherits_from)?, Vec::new()))
            })?;
            Ok(v)
        })
    }

    pub fn create_change_set(&mut self, request: &NewChangeSet) -> Result<CreatedChangeSet> {
        logged("create_change_set", || {
            let (created, _) = run_round(&self.repo, &mut self.conn, &self.id, |tx, round| {
                Ok((create_change_set(tx, round, request)?, Vec::new()))
            })?;
            Ok(created)
        })
    }

    /// Wrap an existing change set in a new commit under `parent_commit_id`
    pub fn create_commit(&mut self, change_set_id: &str, parent_commit_id: &str) -> Result<Commit> {
        logged("create_commit", || {
            let (commit, _) = run_round(&self.repo, &mut self.conn, &self.id, |tx, round| {
                Ok((create_commit(tx, round, change_set_id, parent_commit_id)?, Vec::new()))
            })?;
            Ok(commit)
        })
    }

    pub fn add_change_set_elements(&mut self, change_set_id: &str, change_ids: &[String]) -> Result<()> {
        logged("add_change_set_elements", || {
            run_tx(&mut self.conn, |tx| add_elements(tx, change_set_id, change_ids))
        })
    }

    /// Returns whether the set held an element for `key`
    pub fn remove_change_set_element(&mut self, change_set_id: &str, key: &EntityKey) -> Result<bool> {
        logged("remove_change_set_element", || {
            run_tx(&mut self.conn, |tx| {
                change_set::remove_element(tx, change_set_id, key)
            })
        })
    }

    /// Attach label `name` (created on first use) to an entity
    pub fn label_entity(&mut self, key: &EntityKey, name: &str) -> Result<Label> {
        logged("label_entity", || {
            if name.trim().is_empty() {
                return Err(StateError::InvalidInput {
                    reason: "label name must not be empty".to_string(),
                }
                .into());
            }
            let (attached, _) = run_round(&self.repo, &mut self.conn, &self.id, |tx, round| {
                let l = label::ensure_label(tx, name, || round.next_id())?;
                label::attach_label(tx, key, &l.id)?;
                Ok((l, Vec::new()))
            })?;
            Ok(attached)
        })
    }

    pub fn register_schema(&mut self, stored: &StoredSchema) -> Result<()> {
        logged("register_schema", || {
            run_tx(&mut self.conn, |tx| schema::register_schema(tx, stored))
        })
    }

    // ===== Cache maintenance =====

    /// Drop cached rows of one version, or of every version; returns the
    /// number of rows removed. Later reads reconstruct from history.
    pub fn drop_cache(&mut self, version_id: Option<&str>) -> Result<usize> {
        logged("drop_cache", || {
            run_tx(&mut self.conn, |tx| cache::drop_rows(tx, version_id))
        })
    }

    /// Drop the cached row of one entity in one version
    pub fn drop_cache_entry(&mut self, version_id: &str, key: &EntityKey) -> Result<bool> {
        logged("drop_cache_entry", || {
            run_tx(&mut self.conn, |tx| cache::delete_entry(tx, key, version_id))
        })
    }

    /// Rematerialize every own row of `version_id` from history
    pub fn rebuild_cache(&mut self, version_id: &str) -> Result<usize> {
        logged("rebuild_cache", || {
            run_tx(&mut self.conn, |tx| {
                let head = version::require_version(tx, version_id)?.commit_id;
                cache::drop_rows(tx, Some(version_id))?;
                let entries = materialize::materialize_entries(tx, &head, version_id)?;
                for entry in &entries {
                    cache::upsert_entry(tx, entry)?;
                }
                cache::set_complete(tx, version_id, true)?;
                tracing::debug!(version_id, rows = entries.len(), "rebuilt cache");
                Ok(entries.len())
            })
        })
    }

    // ===== Resolution =====

    /// The resolved row of `key` in `version_id`, this session's stage
    /// included
    pub fn get(&self, version_id: &str, key: &EntityKey) -> Result<Option<StateRow>> {
        version::require_version(&self.conn, version_id)?;
        self.resolve(key, version_id)
    }

    /// Every resolved row of a version, ordered by entity key
    pub fn select_state(&self, filter: &StateFilter) -> Result<Vec<StateRow>> {
        version::require_version(&self.conn, &filter.version_id)?;
        resolve::select_state(&self.conn, self.read_options(), &self.stage, filter)
    }

    /// Pending changes of a version: its working set joined with the changes
    pub fn working_changes(&self, version_id: &str) -> Result<Vec<WorkingChange>> {
        let v = version::require_version(&self.conn, version_id)?;
        let working = commit_graph::require_commit(&self.conn, &v.working_commit_id)?;
        change_set::list_elements(&self.conn, &working.change_set_id)?
            .into_iter()
            .map(|element| -> Result<WorkingChange> {
                let change = change_log::get_change(&self.conn, &element.change_id)?.ok_or_else(
                    || StateError::ChangeNotFound {
                        change_id: element.change_id.clone(),
                    },
                )?;
                Ok(WorkingChange {
                    change_set_id: element.change_set_id,
                    change,
                })
            })
            .collect()
    }

    /// Every change for `key` reachable from the head of `version_id`,
    /// newest first
    pub fn entity_history(&self, version_id: &str, key: &EntityKey) -> Result<Vec<Change>> {
        let head = version::require_version(&self.conn, version_id)?.commit_id;
        materialize::entity_history(&self.conn, &head, key)
    }

    /// Entity-level difference between the materialized states of two commits
    pub fn diff_commits(&self, before: &str, after: &str) -> Result<StateDiff> {
        commit_graph::require_commit(&self.conn, before)?;
        commit_graph::require_commit(&self.conn, after)?;
        let a = materialize::live_entities(&self.conn, before)?;
        let b = materialize::live_entities(&self.conn, after)?;
        Ok(compute_state_diff(before, &a, after, &b))
    }

    pub fn is_ancestor_of(&self, a: &str, b: &str, options: AncestryOptions) -> Result<bool> {
        commit_graph::is_ancestor_of(&self.conn, a, b, options)
    }

    // ===== Introspection =====

    pub fn get_change(&self, change_id: &str) -> Result<Option<Change>> {
        change_log::get_change(&self.conn, change_id)
    }

    pub fn list_changes(&self, filter: &ChangeFilter) -> Result<Vec<Change>> {
        change_log::list_changes(&self.conn, filter)
    }

    pub fn get_change_set(&self, change_set_id: &str) -> Result<Option<ChangeSet>> {
        change_set::get_change_set(&self.conn, change_set_id)
    }

    pub fn list_change_sets(&self) -> Result<Vec<ChangeSet>> {
        change_set::list_change_sets(&self.conn)
    }

    pub fn list_change_set_elements(&self, change_set_id: &str) -> Result<Vec<ChangeSetElement>> {
        change_set::list_elements(&self.conn, change_set_id)
    }

    pub fn get_commit(&self, commit_id: &str) -> Result<Option<Commit>> {
        commit_graph::get_commit(&self.conn, commit_id)
    }

    pub fn list_commits(&self) -> Result<Vec<Commit>> {
        commit_graph::list_commits(&self.conn)
    }

    pub fn commit_parents(&self, commit_id: &str) -> Result<Vec<String>> {
        commit_graph::commit_parents(&self.conn, commit_id)
    }

    pub fn commit_children(&self, commit_id: &str) -> Result<Vec<String>> {
        commit_graph::commit_children(&self.conn, commit_id)
    }

    pub fn list_commit_edges(&self) -> Result<Vec<CommitEdge>> {
        commit_graph::list_edges(&self.conn)
    }

    pub fn get_version(&self, version_id: &str) -> Result<Option<Version>> {
        version::get_version(&self.conn, version_id)
    }

    pub fn get_version_by_name(&self, name: &str) -> Result<Option<Version>> {
        version::get_version_by_name(&self.conn, name)
    }

    pub fn list_versions(&self) -> Result<Vec<Version>> {
        version::list_versions(&self.conn)
    }

    pub fn list_labels(&self) -> Result<Vec<Label>> {
        label::list_labels(&self.conn)
    }

    pub fn labels_for_entity(&self, key: &EntityKey) -> Result<Vec<Label>> {
        label::labels_for_entity(&self.conn, key)
    }

    pub fn list_entity_labels(&self) -> Result<Vec<EntityLabel>> {
        label::list_entity_labels(&self.conn)
    }

    pub fn get_schema(&self, schema_key: &str, schema_version: &str) -> Result<Option<StoredSchema>> {
        schema::get_schema(&self.conn, schema_key, schema_version)
    }

    pub fn list_schemas(&self) -> Result<Vec<StoredSchema>> {
        schema::list_schemas(&self.conn)
    }

    /// Current value of the round sequence counter
    pub fn round_sequence(&self) -> Result<u64> {
        key_value::round_sequence(&self.conn)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.stage.is_empty() {
            tracing::debug!(
                session_id = %self.id,
                staged = self.stage.len(),
                "session closed with uncommitted writes"
            );
        }
    }
}

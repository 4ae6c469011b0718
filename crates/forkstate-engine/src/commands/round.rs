//! One mutating round: shared clock, realized changes and queued
//! bookkeeping rows
//!
//! A round lives inside a single `BEGIN IMMEDIATE` transaction. Every change
//! it realizes carries the round's timestamp; the change log append and the
//! sequence advance happen once, in `finish`.

#![allow(clippy::result_large_err)]

use forkstate_core::model::{
    Change, EntityKey, BOOKKEEPING_FILE_ID, BOOKKEEPING_PLUGIN_KEY, BOOKKEEPING_SCHEMA_VERSION,
    GLOBAL_VERSION_ID,
};
use forkstate_core::{RoundClock, StagedChange, StagedOp};
use forkstate_store::errors::Result;
use forkstate_store::repo::{change_log, key_value};
use rusqlite::Transaction;
use serde::Serialize;

pub(crate) struct Round {
    clock: RoundClock,
    created_at: String,
    realized: Vec<Change>,
    meta: Vec<StagedChange>,
    issued: usize,
}

impl Round {
    pub(crate) fn begin(tx: &Transaction<'_>, deterministic_seed_ms: Option<u64>) -> Result<Self> {
        let clock = key_value::begin_round(tx, deterministic_seed_ms)?;
        let created_at = clock.timestamp();
        Ok(Self {
            clock,
            created_at,
            realized: Vec::new(),
            meta: Vec::new(),
            issued: 0,
        })
    }

    pub(crate) fn next_id(&mut self) -> Result<String> {
        self.issued += 1;
        Ok(self.clock.next_id()?)
    }

    /// No id issued and nothing realized; such a round need not advance the
    /// sequence
    pub(crate) fn is_idle(&self) -> bool {
        self.issued == 0 && self.realized.is_empty()
    }

    /// Turn a staged write into a change of this round
    pub(crate) fn realize(&mut self, staged: &StagedChange) -> Result<Change> {
        let change = Change {
            id: self.next_id()?,
            entity_id: staged.key.entity_id.clone(),
            schema_key: staged.key.schema_key.clone(),
            file_id: staged.key.file_id.clone(),
            plugin_key: staged.plugin_key.clone(),
            schema_version: staged.schema_version.clone(),
            snapshot_content: staged.snapshot_content.clone(),
            created_at: self.created_at.clone(),
        };
        self.realized.push(change.clone());
        Ok(change)
    }

    /// Queue a bookkeeping row for `global`
    pub(crate) fn record<T: Serialize>(
        &mut self,
        schema_key: &str,
        entity_id: impl Into<String>,
        row: &T,
    ) -> Result<()> {
        self.meta.push(StagedChange {
            version_id: GLOBAL_VERSION_ID.to_string(),
            key: EntityKey::new(entity_id, schema_key, BOOKKEEPING_FILE_ID),
            op: StagedOp::Update,
            plugin_key: BOOKKEEPING_PLUGIN_KEY.to_string(),
            schema_version: BOOKKEEPING_SCHEMA_VERSION.to_string(),
            snapshot_content: Some(serde_json::to_value(row)?),
        });
        Ok(())
    }

    /// Drain queued bookkeeping rows; a later row for the same key replaces
    /// an earlier one
    pub(crate) fn take_meta(&mut self) -> Vec<StagedChange> {
        let mut out: Vec<StagedChange> = Vec::with_capacity(self.meta.len());
        for row in self.meta.drain(..) {
            match out.iter_mut().find(|r| r.key == row.key) {
                Some(existing) => *existing = row,
                None => out.push(row),
            }
        }
        out
    }

    /// Append every realized change and advance the round sequence
    ///
    /// Returns the new sequence value and the realized changes.
    pub(crate) fn finish(mut self, tx: &Transaction<'_>) -> Result<(u64, Vec<Change>)> {
        change_log::append_changes(tx, &self.realized)?;
        let sequence = key_value::finish_round(tx, &self.clock)?;
        Ok((sequence, std::mem::take(&mut self.realized)))
    }
}

//! Per-session buffer of uncommitted writes
//!
//! The stage is keyed by `(version_id, entity key)`. A later write to the same
//! key replaces the earlier one, folding the two operations together:
//!
//! | staged   | new      | result            |
//! |----------|----------|-------------------|
//! | Insert   | Update   | Insert (new data) |
//! | Insert   | Delete   | entry removed     |
//! | Update   | Delete   | Delete            |
//! | Delete   | Insert   | Update            |
//!
//! Draining is non-destructive: the commit pipeline reads `grouped()` and the
//! caller clears the stage only after the round's transaction has committed.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::model::{EntityKey, GLOBAL_VERSION_ID};

/// The kind of write a staged change stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedOp {
    /// Creates an entity absent from committed state
    Insert,
    /// Replaces the content of a committed entity
    Update,
    /// Removes a committed entity
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagedChange {
    pub version_id: String,
    pub key: EntityKey,
    pub op: StagedOp,
    pub plugin_key: String,
    pub schema_version: String,
    /// `None` for deletions
    pub snapshot_content: Option<Value>,
}

impl StagedChange {
    pub fn is_deletion(&self) -> bool {
        self.op == StagedOp::Delete
    }
}

#[derive(Debug, Clone)]
struct Slot {
    seq: u64,
    change: StagedChange,
}

/// Staged writes of one session
#[derive(Debug, Clone, Default)]
pub struct Stage {
    entries: BTreeMap<(String, EntityKey), Slot>,
    next_seq: u64,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a write, folding it into any staged write for the same key
    pub fn stage(&mut self, change: StagedChange) {
        let slot_key = (change.version_id.clone(), change.key.clone());
        let seq = self.next_seq;
        self.next_seq += 1;

        let folded = match self.entries.get(&slot_key).map(|s| s.change.op) {
            Some(StagedOp::Insert) if change.op == StagedOp::Delete => None,
            Some(StagedOp::Insert) => Some(StagedChange {
                op: StagedOp::Insert,
                ..change
            }),
            Some(StagedOp::Delete) if change.op == StagedOp::Insert => Some(StagedChange {
                op: StagedOp::Update,
                ..change
            }),
            _ => Some(change),
        };

        match folded {
            Some(change) => {
                self.entries.insert(slot_key, Slot { seq, change });
            }
            None => {
                self.entries.remove(&slot_key);
            }
        }
    }

    /// Staged write for one key, if any
    pub fn get(&self, version_id: &str, key: &EntityKey) -> Option<&StagedChange> {
        self.entries
            .get(&(version_id.to_string(), key.clone()))
            .map(|s| &s.change)
    }

    /// Staged writes of one version in staging order
    pub fn for_version(&self, version_id: &str) -> Vec<&StagedChange> {
        let mut slots: Vec<&Slot> = self
            .entries
            .iter()
            .filter(|((v, _), _)| v == version_id)
            .map(|(_, slot)| slot)
            .collect();
        slots.sort_by_key(|s| s.seq);
        slots.into_iter().map(|s| &s.change).collect()
    }

    /// Staged writes grouped per version, `global` last, other versions in
    /// id order, changes within a version in staging order
    pub fn grouped(&self) -> Vec<(String, Vec<StagedChange>)> {
        let mut groups: BTreeMap<&str, Vec<&Slot>> = BTreeMap::new();
        for ((version_id, _), slot) in &self.entries {
            groups.entry(version_id.as_str()).or_default().push(slot);
        }

        let mut global = None;
        let mut out = Vec::with_capacity(groups.len());
        for (version_id, mut slots) in groups {
            slots.sort_by_key(|s| s.seq);
            let changes: Vec<StagedChange> = slots.into_iter().map(|s| s.change.clone()).collect();
            if version_id == GLOBAL_VERSION_ID {
                global = Some(changes);
            } else {
                out.push((version_id.to_string(), changes));
            }
        }
        if let Some(changes) = global {
            out.push((GLOBAL_VERSION_ID.to_string(), changes));
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

//! Latest-change-wins reconstruction over reachable change set elements
//!
//! Storage gathers every element of every change set reachable from a head
//! (with the hop depth of the containing commit); this kernel picks, per
//! entity key, the change that defines the current state.

use std::collections::BTreeMap;

use crate::model::EntityKey;

/// One change set element reachable from the head
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachableElement {
    pub key: EntityKey,
    pub change_id: String,
    pub is_deletion: bool,
    pub commit_id: String,
    /// Shortest hop distance of `commit_id` from the head
    pub depth: usize,
}

/// Reconstructed state of one entity key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    /// Greatest change id reachable for the key
    pub latest_change_id: String,
    pub is_deletion: bool,
    /// Commit that introduced the latest change (deepest containing commit,
    /// ties to the smallest id)
    pub commit_id: String,
    /// First change of the live incarnation (after the last deletion);
    /// equals `latest_change_id` for deletions
    pub first_change_id: String,
}

#[derive(Default)]
struct KeyHistory {
    // change id -> (is_deletion, introducing commit, its depth)
    changes: BTreeMap<String, (bool, String, usize)>,
}

/// Reduce reachable elements to one entry per entity key
pub fn materialize<I>(elements: I) -> BTreeMap<EntityKey, Materialized>
where
    I: IntoIterator<Item = ReachableElement>,
{
    let mut histories: BTreeMap<EntityKey, KeyHistory> = BTreeMap::new();
    for el in elements {
        let history = histories.entry(el.key).or_default();
        match history.changes.get_mut(&el.change_id) {
            Some(entry) => {
                let deeper = el.depth > entry.2;
                let tie_smaller = el.depth == entry.2 && el.commit_id < entry.1;
                if deeper || tie_smaller {
                    entry.1 = el.commit_id;
                    entry.2 = el.depth;
                }
            }
            None => {
                history
                    .changes
                    .insert(el.change_id, (el.is_deletion, el.commit_id, el.depth));
            }
        }
    }

    histories
        .into_iter()
        .filter_map(|(key, history)| {
            let (latest_id, (is_deletion, commit_id, _)) = history.changes.iter().next_back()?;
            let first_change_id = if *is_deletion {
                latest_id.clone()
            } else {
                history
                    .changes
                    .iter()
                    .rev()
                    .take_while(|(_, (deleted, _, _))| !*deleted)
                    .last()
                    .map(|(id, _)| id.clone())
                    .unwrap_or_else(|| latest_id.clone())
            };
            Some((
                key,
                Materialized {
                    latest_change_id: latest_id.clone(),
                    is_deletion: *is_deletion,
                    commit_id: commit_id.clone(),
                    first_change_id,
                },
            ))
        })
        .collect()
}

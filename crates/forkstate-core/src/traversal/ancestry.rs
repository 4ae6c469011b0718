use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::errors::ExResult;
use crate::model::AncestryOptions;

/// Parent lookup over commit edges
pub trait EdgeSource {
    /// Direct parents of `commit_id` (empty for roots and unknown ids)
    fn parents(&self, commit_id: &str) -> ExResult<Vec<String>>;
}

/// Is `a` an ancestor of `b`?
///
/// Walks parent edges breadth-first from `b`, never revisiting a commit.
/// `max_depth` bounds the number of edge hops from `b`.
pub fn is_ancestor_of<S: EdgeSource + ?Sized>(
    source: &S,
    a: &str,
    b: &str,
    options: AncestryOptions,
) -> ExResult<bool> {
    if a == b {
        return Ok(options.include_self);
    }

    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    visited.insert(b.to_string());
    queue.push_back((b.to_string(), 0));

    while let Some((commit_id, depth)) = queue.pop_front() {
        if options.max_depth.is_some_and(|max| depth >= max) {
            continue;
        }
        for parent in source.parents(&commit_id)? {
            if parent == a {
                return Ok(true);
            }
            if visited.insert(parent.clone()) {
                queue.push_back((parent, depth + 1));
            }
        }
    }
    Ok(false)
}

/// Every commit reachable from `head` (inclusive) with its shortest hop
/// distance, in breadth-first order
pub fn ancestors<S: EdgeSource + ?Sized>(source: &S, head: &str) -> ExResult<Vec<(String, usize)>> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    let mut out = Vec::new();
    visited.insert(head.to_string());
    queue.push_back((head.to_string(), 0));

    while let Some((commit_id, depth)) = queue.pop_front() {
        for parent in source.parents(&commit_id)? {
            if visited.insert(parent.clone()) {
                queue.push_back((parent, depth + 1));
            }
        }
        out.push((commit_id, depth));
    }
    Ok(out)
}

/// In-memory adjacency keyed by child commit id
#[derive(Debug, Clone, Default)]
pub struct AdjacencyMap {
    parents: BTreeMap<String, Vec<String>>,
}

impl AdjacencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, parent_id: impl Into<String>, child_id: impl Into<String>) {
        self.parents
            .entry(child_id.into())
            .or_default()
            .push(parent_id.into());
    }
}

impl EdgeSource for AdjacencyMap {
    fn parents(&self, commit_id: &str) -> ExResult<Vec<String>> {
        Ok(self.parents.get(commit_id).cloned().unwrap_or_default())
    }
}

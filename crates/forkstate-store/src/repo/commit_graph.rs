//! Commits and the append-only commit DAG

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, Result};
use forkstate_core::errors::{ExResult, StateError};
use forkstate_core::model::{AncestryOptions, Commit, CommitEdge};
use forkstate_core::traversal::{self, EdgeSource};
use rusqlite::{Connection, OptionalExtension};

/// Commit edges read straight from SQLite
pub struct SqliteEdges<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteEdges<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl EdgeSource for SqliteEdges<'_> {
    fn parents(&self, commit_id: &str) -> ExResult<Vec<String>> {
        commit_parents(self.conn, commit_id)
    }
}

pub fn insert_commit(conn: &Connection, commit: &Commit) -> Result<()> {
    conn.execute(
        "INSERT INTO commits (id, change_set_id) VALUES (?1, ?2)",
        rusqlite::params![commit.id, commit.change_set_id],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

pub fn get_commit(conn: &Connection, commit_id: &str) -> Result<Option<Commit>> {
    conn.query_row(
        "SELECT id, change_set_id FROM commits WHERE id = ?1",
        [commit_id],
        |row| {
            Ok(Commit {
                id: row.get(0)?,
                change_set_id: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(from_rusqlite)
}

/// Fetch a commit or fail with `NotFound`
pub fn require_commit(conn: &Connection, commit_id: &str) -> Result<Commit> {
    get_commit(conn, commit_id)?.ok_or_else(|| {
        StateError::CommitNotFound {
            commit_id: commit_id.to_string(),
        }
        .into()
    })
}

pub fn list_commits(conn: &Connection) -> Result<Vec<Commit>> {
    let mut stmt = conn
        .prepare("SELECT id, change_set_id FROM commits ORDER BY id")
        .map_err(from_rusqlite)?;
    let commits = stmt
        .query_map([], |row| {
            Ok(Commit {
                id: row.get(0)?,
                change_set_id: row.get(1)?,
            })
        })
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(commits)
}

/// Append `parent -> child`
///
/// Both commits must exist, the edge may not be a self-edge, and the child
/// may not already be an ancestor of the parent.
pub fn insert_edge(conn: &Connection, parent_id: &str, child_id: &str) -> Result<()> {
    let invalid = |reason: &str| -> forkstate_core::ExError {
        StateError::InvalidCommitEdge {
            parent_id: parent_id.to_string(),
            child_id: child_id.to_string(),
            reason: reason.to_string(),
        }
        .into()
    };

    if parent_id == child_id {
        return Err(invalid("self-edge"));
    }
    if get_commit(conn, parent_id)?.is_none() {
        return Err(invalid("parent commit does not exist"));
    }
    if get_commit(conn, child_id)?.is_none() {
        return Err(invalid("child commit does not exist"));
    }
    // a child without children of its own cannot reach the parent, so fresh
    // commits skip the walk
    let closes_cycle = !commit_children(conn, child_id)?.is_empty()
        && traversal::is_ancestor_of(
            &SqliteEdges::new(conn),
            child_id,
            parent_id,
            AncestryOptions::default(),
        )?;
    if closes_cycle {
        return Err(invalid("edge would close a cycle"));
    }

    conn.execute(
        "INSERT OR IGNORE INTO commit_edges (parent_id, child_id) VALUES (?1, ?2)",
        rusqlite::params![parent_id, child_id],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

pub fn commit_parents(conn: &Connection, commit_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare_cached("SELECT parent_id FROM commit_edges WHERE child_id = ?1 ORDER BY parent_id")
        .map_err(from_rusqlite)?;
    let parents = stmt
        .query_map([commit_id], |row| row.get(0))
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<String>, _>>()
        .map_err(from_rusqlite)?;
    Ok(parents)
}

pub fn commit_children(conn: &Connection, commit_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare_cached("SELECT child_id FROM commit_edges WHERE parent_id = ?1 ORDER BY child_id")
        .map_err(from_rusqlite)?;
    let children = stmt
        .query_map([commit_id], |row| row.get(0))
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<String>, _>>()
        .map_err(from_rusqlite)?;
    Ok(children)
}

pub fn list_edges(conn: &Connection) -> Result<Vec<CommitEdge>> {
    let mut stmt = conn
        .prepare("SELECT parent_id, child_id FROM commit_edges ORDER BY child_id, parent_id")
        .map_err(from_rusqlite)?;
    let edges = stmt
        .query_map([], |row| {
            Ok(CommitEdge {
                parent_id: row.get(0)?,
                child_id: row.get(1)?,
            })
        })
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(edges)
}

/// Is `a` an ancestor of `b`? Both commits must exist.
pub fn is_ancestor_of(conn: &Connection, a: &str, b: &str, options: AncestryOptions) -> Result<bool> {
    require_commit(conn, a)?;
    require_commit(conn, b)?;
    traversal::is_ancestor_of(&SqliteEdges::new(conn), a, b, options)
}

//! Version registry rows

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, Result};
use forkstate_core::errors::{ExResult, StateError};
use forkstate_core::model::Version;
use forkstate_core::traversal::ParentSource;
use rusqlite::{Connection, OptionalExtension, Row};

const VERSION_COLUMNS: &str = "id, name, commit_id, working_commit_id, inherits_from_version_id";

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<Version> {
    Ok(Version {
        id: row.get(0)?,
        name: row.get(1)?,
        commit_id: row.get(2)?,
        working_commit_id: row.get(3)?,
        inherits_from_version_id: row.get(4)?,
    })
}

/// Inheritance links read straight from SQLite
pub struct SqliteVersionParents<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteVersionParents<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl ParentSource for SqliteVersionParents<'_> {
    fn inherits_from(&self, version_id: &str) -> ExResult<Option<String>> {
        Ok(require_version(self.conn, version_id)?.inherits_from_version_id)
    }
}

pub fn insert_version(conn: &Connection, version: &Version) -> Result<()> {
    if get_version_by_name(conn, &version.name)?.is_some() {
        return Err(StateError::VersionNameTaken {
            name: version.name.clone(),
        }
        .into());
    }
    conn.execute(
        &format!("INSERT INTO versions ({}) VALUES (?1, ?2, ?3, ?4, ?5)", VERSION_COLUMNS),
        rusqlite::params![
            version.id,
            version.name,
            version.commit_id,
            version.working_commit_id,
            version.inherits_from_version_id
        ],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

pub fn get_version(conn: &Connection, version_id: &str) -> Result<Option<Version>> {
    conn.query_row(
        &format!("SELECT {} FROM versions WHERE id = ?1", VERSION_COLUMNS),
        [version_id],
        version_from_row,
    )
    .optional()
    .map_err(from_rusqlite)
}

/// Fetch a version or fail with `NotFound`
pub fn require_version(conn: &Connection, version_id: &str) -> Result<Version> {
    get_version(conn, version_id)?.ok_or_else(|| {
        StateError::VersionNotFound {
            version_id: version_id.to_string(),
        }
        .into()
    })
}

pub fn get_version_by_name(conn: &Connection, name: &str) -> Result<Option<Version>> {
    conn.query_row(
        &format!("SELECT {} FROM versions WHERE name = ?1", VERSION_COLUMNS),
        [name],
        version_from_row,
    )
    .optional()
    .map_err(from_rusqlite)
}

pub fn list_versions(conn: &Connection) -> Result<Vec<Version>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {} FROM versions ORDER BY id", VERSION_COLUMNS))
        .map_err(from_rusqlite)?;
    let versions = stmt
        .query_map([], version_from_row)
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(versions)
}

/// Move the head and working pointers of a version together
pub fn update_pointers(
    conn: &Connection,
    version_id: &str,
    commit_id: &str,
    working_commit_id: &str,
) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE versions SET commit_id = ?2, working_commit_id = ?3 WHERE id = ?1",
            rusqlite::params![version_id, commit_id, working_commit_id],
        )
        .map_err(from_rusqlite)?;
    if updated == 0 {
        return Err(StateError::VersionNotFound {
            version_id: version_id.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Re-point inheritance; the caller checks for cycles first
pub fn set_inherits_from(
    conn: &Connection,
    version_id: &str,
    inherits_from: Option<&str>,
) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE versions SET inherits_from_version_id = ?2 WHERE id = ?1",
            rusqlite::params![version_id, inherits_from],
        )
        .map_err(from_rusqlite)?;
    if updated == 0 {
        return Err(StateError::VersionNotFound {
            version_id: version_id.to_string(),
        }
        .into());
    }
    Ok(())
}

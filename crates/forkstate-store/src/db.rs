//! Database connection management
//!
//! Every session owns its own connection; all of them are opened and
//! configured through here.

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;

/// Where a repository's connections point
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbTarget {
    /// On-disk database file (WAL journal)
    File(std::path::PathBuf),
    /// Named shared-cache in-memory database; lives while any connection to
    /// it stays open
    SharedMemory(String),
}

impl DbTarget {
    /// A fresh, uniquely named in-memory database
    pub fn unique_memory() -> Self {
        DbTarget::SharedMemory(format!(
            "file:forkstate-{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4().simple()
        ))
    }
}

/// Open a SQLite database at the given path
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
    Connection::open(path).map_err(from_rusqlite)
}

/// Open a connection to `target` and configure it
pub fn connect(target: &DbTarget, busy_timeout: Duration) -> Result<Connection> {
    let conn = match target {
        DbTarget::File(path) => open(path)?,
        DbTarget::SharedMemory(uri) => Connection::open_with_flags(
            uri,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(from_rusqlite)?,
    };
    configure(&conn, busy_timeout, matches!(target, DbTarget::File(_)))?;
    Ok(conn)
}

/// Open a private in-memory database (for testing)
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(from_rusqlite)?;
    configure(&conn, Duration::from_millis(0), false)?;
    Ok(conn)
}

/// Configure a connection: foreign keys, lock wait bound and, for files, WAL
pub fn configure(conn: &Connection, busy_timeout: Duration, wal: bool) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", true)
        .map_err(from_rusqlite)?;

    conn.busy_timeout(busy_timeout).map_err(from_rusqlite)?;

    if wal {
        // journal_mode answers with the resulting mode
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(from_rusqlite)?;
        tracing::debug!(journal_mode = %mode, "configured connection");
    }

    Ok(())
}

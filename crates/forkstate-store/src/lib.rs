//! forkstate store - SQLite persistence for the change-controlled entity store
//!
//! Provides:
//! - Connection setup (file with WAL, or shared-cache in-memory)
//! - Embedded migrations with checksum tracking
//! - Table-level access to changes, change sets, the commit graph, versions,
//!   labels, untracked rows and the partitioned state cache
//! - Full reconstruction of entity state from history

pub mod db;
pub mod errors;
pub mod migrations;
pub mod repo;

// Re-export key types
pub use errors::Result;

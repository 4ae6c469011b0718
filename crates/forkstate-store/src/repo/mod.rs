//! Table-level persistence for the change-controlled store
//!
//! Free functions over `&Connection`; callers that need atomicity pass a
//! `Transaction`, which derefs to a connection.

pub mod cache;
pub mod change_log;
pub mod change_set;
pub mod commit_graph;
pub mod key_value;
pub mod label;
pub mod materialize;
pub mod schema;
pub mod untracked;
pub mod version;

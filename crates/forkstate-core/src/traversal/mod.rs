//! Graph walks over the commit DAG and the version inheritance forest
//!
//! Both walks are iterative worklists over adjacency fetched through a small
//! trait, so the same code runs against SQLite and against in-memory maps.

pub mod ancestry;
pub mod inheritance;

pub use ancestry::{ancestors, is_ancestor_of, AdjacencyMap, EdgeSource};
pub use inheritance::{inheritance_chain, resolve_through_chain, would_close_cycle, ChainLookup, ParentSource};

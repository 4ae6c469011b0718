//! Entity-level diff between two materialized commit states

pub mod engine;
pub mod model;

pub use engine::compute_state_diff;
pub use model::{DiffEntry, StateDiff};

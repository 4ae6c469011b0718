//! Mutating commands
//!
//! Each command runs inside a caller-owned `BEGIN IMMEDIATE` transaction and
//! draws ids from the caller's `Round`. `Session` owns the lock, the round
//! and lifecycle logging.

pub mod change_set;
pub mod checkpoint;
pub mod commit;
pub(crate) mod round;
pub mod version;

pub use change_set::CreatedChangeSet;
pub use checkpoint::CheckpointOutcome;

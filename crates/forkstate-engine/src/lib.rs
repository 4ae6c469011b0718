//! forkstate engine - sessions, rounds and resolution over the store
//!
//! - [`Repository`]: shared handle (configuration, commit lock, subscribers)
//! - [`Session`]: owned connection plus transaction stage; the only write path
//! - `commands`: the commit pipeline, checkpoints, versions and change sets,
//!   each running inside one round
//! - `resolve`: stage > untracked > cache > inherited cache precedence

pub mod commands;
pub mod config;
pub mod events;
pub mod repository;
pub(crate) mod resolve;
pub mod session;

pub use commands::{CheckpointOutcome, CreatedChangeSet};
pub use config::StoreConfig;
pub use events::{CommitEvent, VersionCommit};
pub use repository::Repository;
pub use session::Session;

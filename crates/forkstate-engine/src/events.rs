//! Commit-completed notifications
//!
//! Every successful mutating round is announced to subscribers registered
//! through `Repository::subscribe`. Disconnected receivers are dropped on the
//! next send.

use forkstate_core::model::Change;
use forkstate_core_types::SessionId;

/// Commit created for one version during a round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCommit {
    pub version_id: String,
    pub commit_id: String,
    pub change_set_id: String,
}

/// Outcome of one durable round
#[derive(Debug, Clone, PartialEq)]
pub struct CommitEvent {
    /// Value of the round sequence counter after the round
    pub round: u64,
    pub session_id: SessionId,
    /// Commits in creation order; `global` last
    pub commits: Vec<VersionCommit>,
    /// Every change appended by the round, bookkeeping included
    pub changes: Vec<Change>,
}

impl CommitEvent {
    pub fn commit_for(&self, version_id: &str) -> Option<&VersionCommit> {
        self.commits.iter().find(|c| c.version_id == version_id)
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty() && self.changes.is_empty()
    }
}

use serde::{Deserialize, Serialize};

/// Reserved root version holding bookkeeping rows
pub const GLOBAL_VERSION_ID: &str = "global";
/// Reserved default version; inherits from `global`
pub const MAIN_VERSION_ID: &str = "main";

/// A named branch
///
/// `commit_id` is the head; `working_commit_id` collects the changes made
/// since the last checkpoint and is never sealed while it is the working one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub name: String,
    pub commit_id: String,
    pub working_commit_id: String,
    pub inherits_from_version_id: Option<String>,
}

impl Version {
    pub fn is_reserved(&self) -> bool {
        self.id == GLOBAL_VERSION_ID || self.id == MAIN_VERSION_ID
    }
}

/// Request to create a version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewVersion {
    pub name: String,
    /// Head is taken from this version; `None` starts from an empty root commit
    pub from_version_id: Option<String>,
    pub inherits_from_version_id: Option<String>,
}

impl NewVersion {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_version(mut self, version_id: impl Into<String>) -> Self {
        self.from_version_id = Some(version_id.into());
        self
    }

    pub fn inheriting(mut self, version_id: impl Into<String>) -> Self {
        self.inherits_from_version_id = Some(version_id.into());
        self
    }
}

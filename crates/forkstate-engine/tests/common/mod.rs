// Shared fixtures for engine integration tests

#![allow(dead_code)]

use forkstate_core::model::{EntityKey, EntityWrite};
use forkstate_engine::{Repository, Session, StoreConfig};
use serde_json::{json, Value};
use tempfile::TempDir;

/// On-disk repository in a fresh temp dir; keep the dir alive for the test
pub fn setup_repo() -> (TempDir, Repository) {
    setup_repo_with(|config| config)
}

pub fn setup_repo_with(adjust: impl FnOnce(StoreConfig) -> StoreConfig) -> (TempDir, Repository) {
    let temp_dir = TempDir::new().unwrap();
    let config = adjust(StoreConfig::at_path(temp_dir.path().join("state.db")));
    let repo = Repository::open(config).unwrap();
    (temp_dir, repo)
}

pub fn session(repo: &Repository) -> Session {
    repo.session().unwrap()
}

pub fn todo(entity_id: &str) -> EntityKey {
    EntityKey::new(entity_id, "todo", "todos.json")
}

pub fn write(entity_id: &str, title: &str) -> EntityWrite {
    EntityWrite::new(todo(entity_id), json!({ "title": title }))
}

/// Title of the resolved row, if the entity is visible
pub fn title(session: &Session, version_id: &str, entity_id: &str) -> Option<String> {
    session
        .get(version_id, &todo(entity_id))
        .unwrap()
        .map(|row| row.snapshot_content["title"].as_str().unwrap().to_string())
}

pub fn content(title: &str) -> Value {
    json!({ "title": title })
}

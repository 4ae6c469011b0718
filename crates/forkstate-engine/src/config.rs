//! Repository configuration
//!
//! ```toml
//! path = "state.db"          # omit for a private in-memory store
//! deterministic_mode = false
//! deterministic_seed_ms = 0
//! strict_schemas = false
//! busy_timeout_ms = 5000
//! cache_read_through = true
//! ```

#![allow(clippy::result_large_err)]

use forkstate_core::errors::{ExError, ExErrorKind};
use forkstate_store::errors::{io_error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Database file; `None` opens a shared in-memory database that lives
    /// as long as the repository
    pub path: Option<PathBuf>,
    /// Derive ids and timestamps from the round sequence instead of the wall
    /// clock
    pub deterministic_mode: bool,
    /// Millisecond origin of deterministic rounds
    pub deterministic_seed_ms: u64,
    /// Reject writes whose `(schema_key, schema_version)` has no stored schema
    pub strict_schemas: bool,
    /// Bound on SQLite lock waits
    pub busy_timeout_ms: u64,
    /// Write reconstructed rows back into the cache on a read miss
    pub cache_read_through: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            deterministic_mode: false,
            deterministic_seed_ms: 0,
            strict_schemas: false,
            busy_timeout_ms: 5_000,
            cache_read_through: true,
        }
    }
}

impl StoreConfig {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn deterministic(mut self, seed_ms: u64) -> Self {
        self.deterministic_mode = true;
        self.deterministic_seed_ms = seed_ms;
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Seed for the round clock, when deterministic
    pub fn deterministic_seed(&self) -> Option<u64> {
        self.deterministic_mode.then_some(self.deterministic_seed_ms)
    }

    /// Parse a TOML document
    ///
    /// # Errors
    /// `Config` on malformed TOML or unknown keys.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| {
            ExError::new(ExErrorKind::Config)
                .with_op("load_config")
                .with_message(e.to_string())
        })
    }

    /// Read and parse a TOML file
    ///
    /// A relative `path` inside the file is resolved against the file's
    /// directory.
    ///
    /// # Errors
    /// `Io` when the file cannot be read, `Config` when it does not parse.
    pub fn load(file: impl AsRef<Path>) -> Result<Self> {
        let file = file.as_ref();
        let raw = std::fs::read_to_string(file).map_err(|e| io_error("load_config", e))?;
        let mut config = Self::from_toml_str(&raw)?;
        if let (Some(path), Some(dir)) = (&config.path, file.parent()) {
            if path.is_relative() {
                config.path = Some(dir.join(path));
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert!(config.path.is_none());
        assert!(config.cache_read_through);
        assert_eq!(config.deterministic_seed(), None);
        assert_eq!(config.busy_timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = StoreConfig::from_toml_str("deterministic_mode = true\nstrict_schemas = true").unwrap();
        assert!(config.strict_schemas);
        assert_eq!(config.deterministic_seed(), Some(0));
        assert_eq!(config.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_unknown_key_is_config_error() {
        let err = StoreConfig::from_toml_str("colour = \"blue\"").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Config);
        let err = StoreConfig::from_toml_str("busy_timeout_ms = \"soon\"").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Config);
    }
}

//! Shared repository handle
//!
//! A `Repository` owns the database target, the configuration, the
//! repository-wide commit lock and the commit subscribers. It is cheap to
//! clone; every clone refers to the same store. Work happens through
//! [`Session`]s, each owning its own connection and stage.

#![allow(clippy::result_large_err)]

use std::sync::{mpsc, Arc, Mutex, MutexGuard};

use forkstate_core::errors::{ExError, ExErrorKind};
use forkstate_core::{log_op_end, log_op_error, log_op_start};
use forkstate_store::db::{self, DbTarget};
use forkstate_store::errors::{from_rusqlite, Result};
use forkstate_store::migrations::apply_migrations;
use forkstate_store::repo::key_value;
use rusqlite::{Connection, TransactionBehavior};

use crate::commands::round::Round;
use crate::commands::version::bootstrap;
use crate::config::StoreConfig;
use crate::events::CommitEvent;
use crate::session::Session;

struct Inner {
    config: StoreConfig,
    target: DbTarget,
    commit_lock: Mutex<()>,
    subscribers: Mutex<Vec<mpsc::Sender<CommitEvent>>>,
    // keeps a shared in-memory database alive between sessions
    _anchor: Mutex<Connection>,
}

#[derive(Clone)]
pub struct Repository {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("target", &self.inner.target)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Open (creating if needed) the store described by `config`
    ///
    /// Applies pending migrations and seeds the reserved `global` and `main`
    /// versions on a fresh database.
    pub fn open(config: StoreConfig) -> Result<Self> {
        log_op_start!("repository_open");
        let start = std::time::Instant::now();

        let result = Self::open_impl(config).map_err(|e| {
            log_op_error!(
                "repository_open",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "repository_open",
            duration_ms = start.elapsed().as_millis() as u64
        );
        Ok(result)
    }

    /// Private in-memory store with default settings
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StoreConfig::default())
    }

    /// On-disk store at `path` with default settings
    pub fn open_path(path: impl Into<std::path::PathBuf>) -> Result<Self> {
        Self::open(StoreConfig::at_path(path))
    }

    fn open_impl(config: StoreConfig) -> Result<Self> {
        let target = match &config.path {
            Some(path) => DbTarget::File(path.clone()),
            None => DbTarget::unique_memory(),
        };
        let mut anchor = db::connect(&target, config.busy_timeout())?;
        apply_migrations(&mut anchor)?;

        if config.deterministic_mode {
            key_value::set(&anchor, key_value::KEY_DETERMINISTIC_MODE, "true")?;
        }

        let tx = anchor
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(from_rusqlite)?;
        let mut round = Round::begin(&tx, config.deterministic_seed())?;
        if bootstrap(&tx, &mut round)? {
            round.finish(&tx)?;
            tracing::debug!("seeded reserved versions");
        }
        tx.commit().map_err(from_rusqlite)?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                target,
                commit_lock: Mutex::new(()),
                subscribers: Mutex::new(Vec::new()),
                _anchor: Mutex::new(anchor),
            }),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Open a session with its own connection and an empty stage
    pub fn session(&self) -> Result<Session> {
        let conn = db::connect(&self.inner.target, self.inner.config.busy_timeout())?;
        Ok(Session::new(self.clone(), conn))
    }

    /// Receive a [`CommitEvent`] for every round that committed changes
    pub fn subscribe(&self) -> Result<mpsc::Receiver<CommitEvent>> {
        let (tx, rx) = mpsc::channel();
        self.inner
            .subscribers
            .lock()
            .map_err(|_| poisoned("subscribers"))?
            .push(tx);
        Ok(rx)
    }

    /// Deliver `event` to every live subscriber, dropping disconnected ones
    pub(crate) fn notify(&self, event: &CommitEvent) {
        match self.inner.subscribers.lock() {
            Ok(mut subscribers) => subscribers.retain(|s| s.send(event.clone()).is_ok()),
            Err(_) => tracing::warn!(round = event.round, "commit subscribers unavailable"),
        }
    }

    /// Serialize mutating rounds across every session of this repository
    pub(crate) fn lock_commits(&self) -> Result<MutexGuard<'_, ()>> {
        self.inner
            .commit_lock
            .lock()
            .map_err(|_| poisoned("commit lock"))
    }
}

fn poisoned(what: &str) -> ExError {
    ExError::new(ExErrorKind::Concurrency)
        .with_op("repository")
        .with_message(format!("{} poisoned by a panicking session", what))
}

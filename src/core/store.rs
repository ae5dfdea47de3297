//! Store abstraction for the ledger's state.
//!
//! A store is a directory holding `ledger.db` and an optional `config.toml`.
//! Projects keep it at `<project>/.evoledger/data/`.

use crate::core::capture::ChangeCapture;
use crate::core::config::{self, LedgerConfig};
use crate::core::db;
use crate::core::error::LedgerError;
use std::path::PathBuf;

/// Store handle representing a ledger workspace.
///
/// All subsystem state (agents, telemetry, audit) is scoped to a store.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory
    pub root: PathBuf,
    /// Configuration loaded from `<root>/config.toml` (defaults when absent)
    pub config: LedgerConfig,
}

impl Store {
    /// Open a store rooted at `root`, loading its configuration.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let root = root.into();
        let config = config::load_config(&root)?;
        Ok(Self { root, config })
    }

    pub fn with_config(root: impl Into<PathBuf>, config: LedgerConfig) -> Result<Self, LedgerError> {
        config.validate()?;
        Ok(Self {
            root: root.into(),
            config,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        db::ledger_db_path(&self.root)
    }

    /// Change capture engine observing the configured entity kinds.
    pub fn capture(&self) -> ChangeCapture {
        ChangeCapture::from_config(&self.config.capture)
    }
}

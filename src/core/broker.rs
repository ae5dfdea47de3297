//! The DB Broker is the "Thin Waist" for state access.
//!
//! Every write runs inside one `IMMEDIATE` transaction that commits only if
//! the closure returns `Ok`; an `Err` (or a panic) rolls the whole unit back.
//! This is what binds an entity mutation to its audit record. In-process
//! writers are serialized by a global lock; readers take their own connection
//! and a deferred transaction, so a read sees one commit point. Reads never
//! create the database file.

use crate::core::db;
use crate::core::error;
use rusqlite::{Connection, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

pub struct DbBroker {
    root: PathBuf,
}

impl DbBroker {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Execute a closure inside a write transaction on the specified DB.
    pub fn with_conn<F, R>(
        &self,
        db_path: &Path,
        actor: &str,
        op_name: &str,
        f: F,
    ) -> Result<R, error::LedgerError>
    where
        F: FnOnce(&Connection) -> Result<R, error::LedgerError>,
    {
        static DB_LOCK: Mutex<()> = Mutex::new(());
        // The lock guards no data, so a writer that panicked leaves nothing to repair.
        let _lock = DB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let db_id = db_id(db_path);
        let mut conn = db::db_connect(&db_path.to_string_lossy())?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                info!(op = op_name, actor, db = %db_id, status = "success", "brokered write");
                Ok(value)
            }
            Err(err) => {
                // Dropping the transaction rolls it back; make it explicit so a
                // failed rollback is at least visible.
                if let Err(rollback_err) = tx.rollback() {
                    warn!(op = op_name, db = %db_id, error = %rollback_err, "rollback failed");
                }
                warn!(op = op_name, actor, db = %db_id, status = "rolled_back", error = %err, "brokered write");
                Err(err)
            }
        }
    }

    /// Execute a closure with a read-only snapshot of the specified DB.
    ///
    /// A ledger that was never initialised reads as empty and is not created.
    pub fn with_read<F, R>(&self, db_path: &Path, op_name: &str, f: F) -> Result<R, error::LedgerError>
    where
        F: FnOnce(&Connection) -> Result<R, error::LedgerError>,
    {
        let mut conn = if db_path.exists() {
            db::db_connect(&db_path.to_string_lossy())?
        } else {
            debug!(op = op_name, db = %db_id(db_path), "ledger not initialised, reading empty state");
            db::empty_ledger_connection()?
        };
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let result = f(&tx);
        debug!(op = op_name, db = %db_id(db_path), ok = result.is_ok(), "brokered read");
        result
    }
}

fn db_id(db_path: &Path) -> String {
    db_path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

use crate::core::broker::DbBroker;
use crate::core::error;
use crate::core::schemas;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

/// Connection busy_timeout in seconds.
const BUSY_TIMEOUT_SECS: u64 = 5;

pub fn db_connect(db_path: &str) -> Result<Connection, error::LedgerError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(BUSY_TIMEOUT_SECS))
        .map_err(error::LedgerError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::LedgerError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(error::LedgerError::RusqliteError)?;
    Ok(conn)
}

/// In-memory ledger with the full schema and no rows.
pub fn empty_ledger_connection() -> Result<Connection, error::LedgerError> {
    let conn = Connection::open_in_memory()?;
    for table in schemas::LEDGER_DB_TABLES {
        conn.execute(table, [])?;
    }
    Ok(conn)
}

pub fn ledger_db_path(root: &Path) -> PathBuf {
    root.join(schemas::LEDGER_DB_NAME)
}

pub fn initialize_ledger_db(root: &Path) -> Result<(), error::LedgerError> {
    fs::create_dir_all(root).map_err(|e| {
        error::LedgerError::DatabaseInitializationError(format!("{}: {}", root.display(), e))
    })?;

    let broker = DbBroker::new(root);
    let db_path = ledger_db_path(root);
    broker.with_conn(&db_path, "evoledger", "ledger.init", |conn| {
        for table in schemas::LEDGER_DB_TABLES {
            conn.execute(table, [])?;
        }
        conn.execute_batch(schemas::LEDGER_DB_SCHEMA_INDEXES)?;
        Ok(())
    })
}

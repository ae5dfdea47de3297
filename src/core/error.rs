use rusqlite;
use std::collections::BTreeMap;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Failed to initialize database: {0}")]
    DatabaseInitializationError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// The audit append for a mutation failed; the mutation was rolled back with it.
    #[error("Audit append failed for {kind}/{entity_id}, mutation rolled back: {source}")]
    AtomicityFailure {
        kind: String,
        entity_id: String,
        #[source]
        source: rusqlite::Error,
    },
    /// A retention pass stopped part-way. Batches committed before the failure stay deleted.
    /// `completed` holds the counts of the passes that finished before it.
    #[error("Retention sweep of {kind} failed after {deleted} deletions: {source}")]
    SweepFailure {
        kind: String,
        deleted: usize,
        completed: BTreeMap<String, usize>,
        #[source]
        source: Box<LedgerError>,
    },
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::ConfigError(err.to_string())
    }
}

//! Retention sweeper.
//!
//! Operational telemetry older than `retention_days` is deleted; audit rows
//! are kept `audit_extra_days` longer (30 by default). Every kind is swept in
//! its own pass, in batches of `batch_size` rows, each batch in its own write
//! transaction. An interrupted sweep leaves the committed batches deleted and
//! can simply be run again.
//!
//! Sweeper deletions are retention, not entity mutations, and are not audited.

use crate::core::broker::DbBroker;
use crate::core::error::LedgerError;
use crate::core::output;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::agents::DEFAULT_ACTOR;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub retention_days: i64,
    /// Operational rows created before this instant were eligible.
    pub operational_cutoff: i64,
    /// Audit rows created before this instant were eligible.
    pub audit_cutoff: i64,
    pub deleted: BTreeMap<String, usize>,
    pub total: usize,
}

/// Delete every row of `table` created before `cutoff`, batch by batch.
fn sweep_kind(
    broker: &DbBroker,
    store: &Store,
    table: &str,
    cutoff: i64,
    batch_size: usize,
    completed: &BTreeMap<String, usize>,
) -> Result<usize, LedgerError> {
    let sql = format!(
        "DELETE FROM {table} WHERE rowid IN (SELECT rowid FROM {table} WHERE created_at < ?1 LIMIT ?2)"
    );
    let op_name = format!("retention.sweep.{}", table);
    let mut deleted = 0usize;
    loop {
        let batch = broker
            .with_conn(&store.db_path(), DEFAULT_ACTOR, &op_name, |conn| {
                Ok(conn.execute(&sql, params![cutoff, batch_size as i64])?)
            })
            .map_err(|source| {
                warn!(kind = table, deleted, completed = ?completed, error = %source, "retention sweep failed");
                LedgerError::SweepFailure {
                    kind: table.to_string(),
                    deleted,
                    completed: completed.clone(),
                    source: Box::new(source),
                }
            })?;
        deleted += batch;
        debug!(kind = table, batch, deleted, "retention batch");
        if batch < batch_size {
            return Ok(deleted);
        }
    }
}

/// Run one retention sweep as of `now`. `retention_days` overrides
/// `[retention].days` from the store configuration.
pub fn run_retention_sweep(
    store: &Store,
    retention_days: Option<i64>,
    now: i64,
) -> Result<SweepReport, LedgerError> {
    let retention = &store.config.retention;
    let days = retention_days.unwrap_or(retention.days);
    if days < 0 {
        return Err(LedgerError::ValidationError(format!(
            "retention_days must not be negative, got {}",
            days
        )));
    }
    let batch_size = retention.batch_size.max(1);
    let operational_cutoff = time::days_before(now, days);
    let audit_cutoff = time::days_before(now, days.saturating_add(retention.audit_extra_days));

    let broker = DbBroker::new(&store.root);
    let mut deleted = BTreeMap::new();
    for table in schemas::OPERATIONAL_KINDS {
        let count = sweep_kind(&broker, store, table, operational_cutoff, batch_size, &deleted)?;
        deleted.insert(table.to_string(), count);
    }
    let count = sweep_kind(&broker, store, schemas::AUDIT_LOG, audit_cutoff, batch_size, &deleted)?;
    deleted.insert(schemas::AUDIT_LOG.to_string(), count);

    let total = deleted.values().sum();
    info!(retention_days = days, total, "retention sweep complete");
    Ok(SweepReport {
        retention_days: days,
        operational_cutoff,
        audit_cutoff,
        deleted,
        total,
    })
}

#[derive(clap::Args, Debug)]
pub struct SweepCli {
    /// Override `[retention].days` for this run.
    #[clap(long)]
    pub retention_days: Option<i64>,
}

pub fn run_sweep_cli(store: &Store, now: i64, cli: SweepCli) -> Result<(), LedgerError> {
    let report = run_retention_sweep(store, cli.retention_days, now)?;
    output::emit("sweep", "report", &report)
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "sweep",
        "version": "0.1.0",
        "description": "Delete aged telemetry; audit history outlives it",
        "commands": [
            { "name": "sweep", "parameters": ["retention_days"] }
        ],
        "storage": ["ledger.db"]
    })
}

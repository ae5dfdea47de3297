//! Audit trail queries.

use crate::core::broker::DbBroker;
use crate::core::capture::{AUDIT_COLUMNS, AuditRecord};
use crate::core::entity;
use crate::core::error::LedgerError;
use crate::core::output;
use crate::core::store::Store;
use crate::core::time;
use rusqlite::types::Value as SqlValue;
use rusqlite::params_from_iter;
use serde::{Deserialize, Serialize};

/// Filters for [`get_audit_trail`]. Empty filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditQuery {
    pub entity_kind: Option<String>,
    pub entity_id: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub since: Option<i64>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.entity_kind = Some(kind.into());
        self
    }

    pub fn entity(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    pub fn since(mut self, ts: i64) -> Self {
        self.since = Some(ts);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Matching audit records, newest first.
pub fn get_audit_trail(store: &Store, query: &AuditQuery) -> Result<Vec<AuditRecord>, LedgerError> {
    if let Some(kind) = &query.entity_kind {
        entity::entity_table(kind)?;
    }

    let mut clauses = Vec::new();
    let mut args: Vec<SqlValue> = Vec::new();
    if let Some(kind) = &query.entity_kind {
        args.push(SqlValue::Text(kind.clone()));
        clauses.push(format!("entity_kind = ?{}", args.len()));
    }
    if let Some(id) = &query.entity_id {
        args.push(SqlValue::Text(id.clone()));
        clauses.push(format!("entity_id = ?{}", args.len()));
    }
    if let Some(since) = query.since {
        args.push(SqlValue::Integer(since));
        clauses.push(format!("created_at >= ?{}", args.len()));
    }

    let mut sql = format!("SELECT {} FROM audit_log", AUDIT_COLUMNS);
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at DESC, rowid DESC");
    if let Some(limit) = query.limit {
        args.push(SqlValue::Integer(limit as i64));
        sql.push_str(&format!(" LIMIT ?{}", args.len()));
    }

    let broker = DbBroker::new(&store.root);
    broker.with_read(&store.db_path(), "audit.trail", |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(args))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(AuditRecord::from_row(row)?);
        }
        Ok(out)
    })
}

#[derive(clap::Args, Debug)]
pub struct AuditCli {
    /// Entity kind (table name), e.g. `performance_metrics`.
    #[clap(long)]
    pub kind: Option<String>,
    #[clap(long)]
    pub id: Option<String>,
    /// Only records at or after this epoch timestamp (`1771220592` or `1771220592Z`).
    #[clap(long)]
    pub since: Option<String>,
    #[clap(long)]
    pub limit: Option<usize>,
}

pub fn run_audit_cli(store: &Store, cli: AuditCli) -> Result<(), LedgerError> {
    let since = cli
        .since
        .as_deref()
        .map(|raw| {
            time::parse_epoch_z(raw).ok_or_else(|| {
                LedgerError::ValidationError(format!("--since is not an epoch timestamp: {}", raw))
            })
        })
        .transpose()?;
    let query = AuditQuery {
        entity_kind: cli.kind,
        entity_id: cli.id,
        since,
        limit: cli.limit,
    };
    output::emit("audit", "records", &get_audit_trail(store, &query)?)
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "audit",
        "version": "0.1.0",
        "description": "Query the change capture log (newest first)",
        "commands": [
            { "name": "audit", "parameters": ["kind", "id", "since", "limit"] }
        ],
        "storage": ["ledger.db"]
    })
}

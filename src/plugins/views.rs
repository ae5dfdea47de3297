//! Read-side aggregation views.
//!
//! One row per active agent, ordered by agent name. Each view is a
//! `LEFT JOIN` from the active agents, so an agent with no rows still appears
//! with empty aggregates. Nothing here is stored; every call recomputes from
//! the entity tables.

use crate::core::broker::DbBroker;
use crate::core::error::LedgerError;
use crate::core::output;
use crate::core::store::Store;
use clap::Subcommand;
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};

/// Synergy at or above this counts as a successful collaboration.
pub const SUCCESSFUL_SYNERGY_THRESHOLD: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub agent_id: String,
    pub agent_name: String,
    pub sample_count: i64,
    pub avg_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_value: Option<f64>,
    pub avg_improvement: Option<f64>,
    pub positive_improvements: i64,
    pub last_sample_at: Option<i64>,
    /// Value of the most recent sample.
    pub last_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecuritySummary {
    pub agent_id: String,
    pub agent_name: String,
    pub event_count: i64,
    pub avg_score: Option<f64>,
    pub min_score: Option<f64>,
    pub threats_detected: Option<i64>,
    pub containment_actions: Option<i64>,
    pub critical_events: i64,
    /// Events scoring below the configured security alert threshold.
    pub incidents: i64,
    pub last_event_at: Option<i64>,
    pub last_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationSummary {
    pub agent_id: String,
    pub agent_name: String,
    pub interaction_count: i64,
    pub avg_synergy: Option<f64>,
    pub max_synergy: Option<f64>,
    pub successful_interactions: i64,
    pub avg_duration_seconds: Option<f64>,
    pub last_interaction_at: Option<i64>,
    pub last_synergy: Option<f64>,
}

fn collect<T>(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>, LedgerError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, map)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn performance_summary(conn: &Connection) -> Result<Vec<PerformanceSummary>, LedgerError> {
    collect(
        conn,
        "SELECT a.id, a.name,
                COUNT(pm.id),
                AVG(pm.current_value), MAX(pm.current_value), MIN(pm.current_value),
                AVG(pm.improvement_percentage),
                COALESCE(SUM(CASE WHEN pm.improvement_percentage > 0 THEN 1 ELSE 0 END), 0),
                MAX(pm.created_at),
                (SELECT p.current_value FROM performance_metrics p
                  WHERE p.agent_id = a.id ORDER BY p.created_at DESC, p.rowid DESC LIMIT 1)
         FROM agents a
         LEFT JOIN performance_metrics pm ON pm.agent_id = a.id
         WHERE a.status = 'active'
         GROUP BY a.id, a.name
         ORDER BY a.name",
        params![],
        |row| {
            Ok(PerformanceSummary {
                agent_id: row.get(0)?,
                agent_name: row.get(1)?,
                sample_count: row.get(2)?,
                avg_value: row.get(3)?,
                max_value: row.get(4)?,
                min_value: row.get(5)?,
                avg_improvement: row.get(6)?,
                positive_improvements: row.get(7)?,
                last_sample_at: row.get(8)?,
                last_value: row.get(9)?,
            })
        },
    )
}

/// `incident_threshold`: scores strictly below it count as incidents.
pub fn security_summary(
    conn: &Connection,
    incident_threshold: f64,
) -> Result<Vec<SecuritySummary>, LedgerError> {
    collect(
        conn,
        "SELECT a.id, a.name,
                COUNT(sl.id),
                AVG(sl.security_score), MIN(sl.security_score),
                SUM(sl.threats_detected), SUM(sl.containment_actions),
                COALESCE(SUM(CASE WHEN sl.severity = 'CRITICAL' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN sl.security_score < ?1 THEN 1 ELSE 0 END), 0),
                MAX(sl.created_at),
                (SELECT s.security_score FROM security_logs s
                  WHERE s.agent_id = a.id ORDER BY s.created_at DESC, s.rowid DESC LIMIT 1)
         FROM agents a
         LEFT JOIN security_logs sl ON sl.agent_id = a.id
         WHERE a.status = 'active'
         GROUP BY a.id, a.name
         ORDER BY a.name",
        params![incident_threshold],
        |row| {
            Ok(SecuritySummary {
                agent_id: row.get(0)?,
                agent_name: row.get(1)?,
                event_count: row.get(2)?,
                avg_score: row.get(3)?,
                min_score: row.get(4)?,
                threats_detected: row.get(5)?,
                containment_actions: row.get(6)?,
                critical_events: row.get(7)?,
                incidents: row.get(8)?,
                last_event_at: row.get(9)?,
                last_score: row.get(10)?,
            })
        },
    )
}

/// Interactions are attributed to their initiator only.
pub fn collaboration_summary(conn: &Connection) -> Result<Vec<CollaborationSummary>, LedgerError> {
    collect(
        conn,
        "SELECT a.id, a.name,
                COUNT(ai.id),
                AVG(ai.synergy_score), MAX(ai.synergy_score),
                COALESCE(SUM(CASE WHEN ai.synergy_score >= ?1 THEN 1 ELSE 0 END), 0),
                AVG(ai.duration_seconds),
                MAX(ai.created_at),
                (SELECT i.synergy_score FROM agent_interactions i
                  WHERE i.initiator_agent_id = a.id ORDER BY i.created_at DESC, i.rowid DESC LIMIT 1)
         FROM agents a
         LEFT JOIN agent_interactions ai ON ai.initiator_agent_id = a.id
         WHERE a.status = 'active'
         GROUP BY a.id, a.name
         ORDER BY a.name",
        params![SUCCESSFUL_SYNERGY_THRESHOLD],
        |row| {
            Ok(CollaborationSummary {
                agent_id: row.get(0)?,
                agent_name: row.get(1)?,
                interaction_count: row.get(2)?,
                avg_synergy: row.get(3)?,
                max_synergy: row.get(4)?,
                successful_interactions: row.get(5)?,
                avg_duration_seconds: row.get(6)?,
                last_interaction_at: row.get(7)?,
                last_synergy: row.get(8)?,
            })
        },
    )
}

pub fn get_performance_summary(store: &Store) -> Result<Vec<PerformanceSummary>, LedgerError> {
    let broker = DbBroker::new(&store.root);
    broker.with_read(&store.db_path(), "views.performance", performance_summary)
}

pub fn get_security_summary(store: &Store) -> Result<Vec<SecuritySummary>, LedgerError> {
    let threshold = store.config.alerts.security_score;
    let broker = DbBroker::new(&store.root);
    broker.with_read(&store.db_path(), "views.security", |conn| {
        security_summary(conn, threshold)
    })
}

pub fn get_collaboration_summary(store: &Store) -> Result<Vec<CollaborationSummary>, LedgerError> {
    let broker = DbBroker::new(&store.root);
    broker.with_read(&store.db_path(), "views.collaboration", collaboration_summary)
}

#[derive(clap::Args, Debug)]
pub struct ViewCli {
    #[clap(subcommand)]
    pub command: ViewCommand,
}

#[derive(Subcommand, Debug)]
pub enum ViewCommand {
    /// Per-agent performance samples.
    Performance,
    /// Per-agent security events.
    Security,
    /// Per-agent collaboration, attributed to the initiator.
    Collaboration,
}

pub fn run_view_cli(store: &Store, cli: ViewCli) -> Result<(), LedgerError> {
    match cli.command {
        ViewCommand::Performance => {
            output::emit("view.performance", "rows", &get_performance_summary(store)?)
        }
        ViewCommand::Security => output::emit("view.security", "rows", &get_security_summary(store)?),
        ViewCommand::Collaboration => {
            output::emit("view.collaboration", "rows", &get_collaboration_summary(store)?)
        }
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "view",
        "version": "0.1.0",
        "description": "Per-agent aggregation views over active agents",
        "commands": [
            { "name": "performance" },
            { "name": "security" },
            { "name": "collaboration" }
        ],
        "storage": ["ledger.db"]
    })
}

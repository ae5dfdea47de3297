//! Operational telemetry written by agents: performance samples, security
//! events and collaboration interactions.
//!
//! Every write validates its input before a transaction opens, then creates
//! exactly one entity through the change capture engine.

use crate::core::broker::DbBroker;
use crate::core::capture::{Snapshot, WriteContext};
use crate::core::entity::{self, FieldMap};
use crate::core::error::LedgerError;
use crate::core::output;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::agents::{self, DEFAULT_ACTOR};
use crate::plugins::evolution::{self, CyclePhases, NewEvolutionCycle};
use clap::Subcommand;
use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::fmt;
use std::str::FromStr;

/// Security event severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(LedgerError::ValidationError(format!(
                "Unknown severity: {} (expected LOW|MEDIUM|HIGH|CRITICAL)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub id: String,
    pub agent_id: String,
    pub metric_name: String,
    pub current_value: f64,
    pub baseline_value: Option<f64>,
    pub improvement_percentage: Option<f64>,
    pub metadata: JsonValue,
    pub created_at: i64,
}

impl Snapshot for MetricSample {
    fn kind(&self) -> &'static str {
        schemas::PERFORMANCE_METRICS
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn snapshot(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("id".into(), json!(self.id));
        fields.insert("agent_id".into(), json!(self.agent_id));
        fields.insert("metric_name".into(), json!(self.metric_name));
        fields.insert("current_value".into(), json!(self.current_value));
        fields.insert("baseline_value".into(), json!(self.baseline_value));
        fields.insert("improvement_percentage".into(), json!(self.improvement_percentage));
        fields.insert("metadata".into(), json!(self.metadata.to_string()));
        fields.insert("created_at".into(), json!(self.created_at));
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: String,
    pub agent_id: String,
    pub severity: Severity,
    pub security_score: f64,
    pub threats_detected: i64,
    pub containment_actions: i64,
    pub created_at: i64,
}

impl Snapshot for SecurityEvent {
    fn kind(&self) -> &'static str {
        schemas::SECURITY_LOGS
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn snapshot(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("id".into(), json!(self.id));
        fields.insert("agent_id".into(), json!(self.agent_id));
        fields.insert("severity".into(), json!(self.severity.as_str()));
        fields.insert("security_score".into(), json!(self.security_score));
        fields.insert("threats_detected".into(), json!(self.threats_detected));
        fields.insert("containment_actions".into(), json!(self.containment_actions));
        fields.insert("created_at".into(), json!(self.created_at));
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: String,
    pub initiator_agent_id: String,
    pub target_agents: Vec<String>,
    pub synergy_score: f64,
    pub duration_seconds: f64,
    pub outcomes: JsonValue,
    pub created_at: i64,
}

impl Snapshot for InteractionRecord {
    fn kind(&self) -> &'static str {
        schemas::AGENT_INTERACTIONS
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn snapshot(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("id".into(), json!(self.id));
        fields.insert("initiator_agent_id".into(), json!(self.initiator_agent_id));
        fields.insert("target_agents".into(), json!(json!(self.target_agents).to_string()));
        fields.insert("synergy_score".into(), json!(self.synergy_score));
        fields.insert("duration_seconds".into(), json!(self.duration_seconds));
        fields.insert("outcomes".into(), json!(self.outcomes.to_string()));
        fields.insert("created_at".into(), json!(self.created_at));
        fields
    }
}

/// Relative change against the baseline, in percent. Undefined without a
/// non-zero baseline.
pub fn improvement_percentage(value: f64, baseline: Option<f64>) -> Option<f64> {
    match baseline {
        Some(b) if b != 0.0 => Some((value - b) / b.abs() * 100.0),
        _ => None,
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), LedgerError> {
    if value.trim().is_empty() {
        Err(LedgerError::ValidationError(format!("{} must not be empty", field)))
    } else {
        Ok(())
    }
}

fn require_finite(field: &str, value: f64) -> Result<(), LedgerError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(LedgerError::ValidationError(format!("{} must be a finite number", field)))
    }
}

fn require_non_negative(field: &str, value: f64) -> Result<(), LedgerError> {
    require_finite(field, value)?;
    if value < 0.0 {
        Err(LedgerError::ValidationError(format!("{} must not be negative", field)))
    } else {
        Ok(())
    }
}

/// Create one entity through the capture engine, after checking the owning
/// agent exists.
pub(crate) fn create_for_agent<E: Snapshot>(
    store: &Store,
    ctx: &WriteContext,
    agent_id: &str,
    op_name: &str,
    entity: &E,
) -> Result<(), LedgerError> {
    create_for_agents(store, ctx, &[agent_id], op_name, entity)
}

/// Create `entity` once every agent it references exists.
pub(crate) fn create_for_agents<E: Snapshot>(
    store: &Store,
    ctx: &WriteContext,
    agent_ids: &[&str],
    op_name: &str,
    entity: &E,
) -> Result<(), LedgerError> {
    let broker = DbBroker::new(&store.root);
    let capture = store.capture();
    broker.with_conn(&store.db_path(), ctx.actor_or(DEFAULT_ACTOR), op_name, |conn| {
        for agent_id in agent_ids {
            agents::ensure_agent_id(conn, agent_id)?;
        }
        capture.create(conn, entity, ctx)?;
        Ok(())
    })
}

pub fn record_metric(
    store: &Store,
    ctx: &WriteContext,
    agent_id: &str,
    metric_name: &str,
    value: f64,
    baseline: Option<f64>,
    metadata: Option<JsonValue>,
) -> Result<MetricSample, LedgerError> {
    require_non_empty("agent_id", agent_id)?;
    require_non_empty("metric_name", metric_name)?;
    require_finite("value", value)?;
    if let Some(b) = baseline {
        require_finite("baseline", b)?;
    }
    let metadata = metadata.unwrap_or_else(|| json!({}));
    if !metadata.is_object() {
        return Err(LedgerError::ValidationError(
            "metadata must be a JSON object".to_string(),
        ));
    }

    let sample = MetricSample {
        id: time::new_event_id(),
        agent_id: agent_id.to_string(),
        metric_name: metric_name.trim().to_string(),
        current_value: value,
        baseline_value: baseline,
        improvement_percentage: improvement_percentage(value, baseline),
        metadata,
        created_at: ctx.now,
    };
    create_for_agent(store, ctx, agent_id, "telemetry.record_metric", &sample)?;
    Ok(sample)
}

pub fn record_security_event(
    store: &Store,
    ctx: &WriteContext,
    agent_id: &str,
    severity: Severity,
    score: f64,
    threats_detected: i64,
    containment_actions: i64,
) -> Result<SecurityEvent, LedgerError> {
    require_non_empty("agent_id", agent_id)?;
    require_finite("security_score", score)?;
    if !(0.0..=1.0).contains(&score) {
        return Err(LedgerError::ValidationError(format!(
            "security_score must be within [0, 1], got {}",
            score
        )));
    }
    if threats_detected < 0 || containment_actions < 0 {
        return Err(LedgerError::ValidationError(
            "threat and containment counts must not be negative".to_string(),
        ));
    }

    let event = SecurityEvent {
        id: time::new_event_id(),
        agent_id: agent_id.to_string(),
        severity,
        security_score: score,
        threats_detected,
        containment_actions,
        created_at: ctx.now,
    };
    create_for_agent(store, ctx, agent_id, "telemetry.record_security_event", &event)?;
    Ok(event)
}

pub fn record_interaction(
    store: &Store,
    ctx: &WriteContext,
    initiator_id: &str,
    target_ids: &[String],
    synergy_score: f64,
    duration_seconds: f64,
    outcomes: JsonValue,
) -> Result<InteractionRecord, LedgerError> {
    require_non_empty("initiator_id", initiator_id)?;
    if target_ids.is_empty() {
        return Err(LedgerError::ValidationError(
            "an interaction needs at least one target agent".to_string(),
        ));
    }
    let mut targets: Vec<String> = Vec::with_capacity(target_ids.len());
    for target in target_ids {
        require_non_empty("target agent id", target)?;
        if !targets.contains(target) {
            targets.push(target.clone());
        }
    }
    require_non_negative("synergy_score", synergy_score)?;
    require_non_negative("duration_seconds", duration_seconds)?;

    let record = InteractionRecord {
        id: time::new_event_id(),
        initiator_agent_id: initiator_id.to_string(),
        target_agents: targets,
        synergy_score,
        duration_seconds,
        outcomes,
        created_at: ctx.now,
    };
    let mut referenced = vec![initiator_id];
    referenced.extend(record.target_agents.iter().map(String::as_str));
    create_for_agents(store, ctx, &referenced, "telemetry.record_interaction", &record)?;
    Ok(record)
}

fn metric_from_row(row: &Row<'_>) -> rusqlite::Result<MetricSample> {
    Ok(MetricSample {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        metric_name: row.get(2)?,
        current_value: row.get(3)?,
        baseline_value: row.get(4)?,
        improvement_percentage: row.get(5)?,
        metadata: entity::json_column(row, 6)?,
        created_at: row.get(7)?,
    })
}

/// Most recent samples of one agent (by id or name), newest first.
pub fn recent_metrics(
    store: &Store,
    agent: &str,
    limit: usize,
) -> Result<Vec<MetricSample>, LedgerError> {
    let broker = DbBroker::new(&store.root);
    broker.with_read(&store.db_path(), "telemetry.recent_metrics", |conn| {
        let agent = agents::require_agent(conn, agent)?;
        let mut stmt = conn.prepare(
            "SELECT id, agent_id, metric_name, current_value, baseline_value, improvement_percentage, metadata, created_at
             FROM performance_metrics WHERE agent_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![agent.id, limit as i64], metric_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

#[derive(clap::Args, Debug)]
pub struct RecordCli {
    #[clap(subcommand)]
    pub command: RecordCommand,
}

#[derive(Subcommand, Debug)]
pub enum RecordCommand {
    /// Record one performance sample.
    Metric {
        /// Agent id or name.
        #[clap(long)]
        agent: String,
        #[clap(long)]
        name: String,
        #[clap(long, allow_negative_numbers = true)]
        value: f64,
        #[clap(long, allow_negative_numbers = true)]
        baseline: Option<f64>,
        /// Metadata as a JSON object.
        #[clap(long)]
        metadata: Option<String>,
    },
    /// Record one security event.
    Security {
        #[clap(long)]
        agent: String,
        #[clap(long)]
        severity: Severity,
        #[clap(long)]
        score: f64,
        #[clap(long, default_value = "0")]
        threats: i64,
        #[clap(long, default_value = "0")]
        containment: i64,
    },
    /// Record one collaboration event, attributed to its initiator.
    Interaction {
        #[clap(long)]
        initiator: String,
        /// Comma-separated target agent ids or names.
        #[clap(long, value_delimiter = ',', required = true)]
        targets: Vec<String>,
        #[clap(long)]
        synergy: f64,
        #[clap(long, default_value = "0")]
        duration: f64,
        #[clap(long, default_value = "{}")]
        outcomes: String,
    },
    /// Record the outcome of one evolution cycle.
    Cycle {
        #[clap(long)]
        cycle_id: String,
        /// JSON object with `core`, `learn` and `guard` phase outputs.
        #[clap(long, default_value = "{}")]
        phases: String,
        #[clap(long, default_value = "{}")]
        metrics: String,
        /// JSON array of validation results.
        #[clap(long, default_value = "[]")]
        validation: String,
        #[clap(long)]
        success: bool,
        #[clap(long, default_value = "0")]
        duration: f64,
        #[clap(long)]
        error: Option<String>,
    },
    /// Record the statistical validation of an improvement.
    Validation {
        #[clap(long)]
        agent: String,
        #[clap(long, allow_negative_numbers = true)]
        improvement: f64,
        #[clap(long)]
        passed: bool,
        #[clap(long)]
        p_value: Option<f64>,
        #[clap(long, default_value = "{}")]
        details: String,
    },
    /// Record a milestone, or mark an existing one achieved.
    Milestone {
        #[clap(long, required_unless_present = "achieved")]
        agent: Option<String>,
        #[clap(long, required_unless_present = "achieved")]
        title: Option<String>,
        #[clap(long, default_value = "")]
        description: String,
        /// Milestone id to mark achieved.
        #[clap(long, conflicts_with_all = ["agent", "title"])]
        achieved: Option<String>,
    },
    /// Create or update an agent capability.
    Capability {
        #[clap(long)]
        agent: String,
        #[clap(long)]
        name: String,
        #[clap(long)]
        level: f64,
        #[clap(long, default_value = "{}")]
        details: String,
    },
}

/// Resolve an agent id or name to its id.
fn agent_id(store: &Store, id_or_name: &str) -> Result<String, LedgerError> {
    Ok(agents::get_agent(store, id_or_name)?.id)
}

fn parse_phases(raw: &str) -> Result<CyclePhases, LedgerError> {
    let value = output::parse_json_arg("phases", raw)?;
    serde_json::from_value(value)
        .map_err(|e| LedgerError::ValidationError(format!("--phases: {}", e)))
}

pub fn run_record_cli(store: &Store, ctx: &WriteContext, cli: RecordCli) -> Result<(), LedgerError> {
    match cli.command {
        RecordCommand::Metric {
            agent,
            name,
            value,
            baseline,
            metadata,
        } => {
            let metadata = metadata
                .map(|m| output::parse_json_arg("metadata", &m))
                .transpose()?;
            let id = agent_id(store, &agent)?;
            let sample = record_metric(store, ctx, &id, &name, value, baseline, metadata)?;
            output::emit("record.metric", "sample", &sample)
        }
        RecordCommand::Security {
            agent,
            severity,
            score,
            threats,
            containment,
        } => {
            let id = agent_id(store, &agent)?;
            let event = record_security_event(store, ctx, &id, severity, score, threats, containment)?;
            output::emit("record.security", "event", &event)
        }
        RecordCommand::Interaction {
            initiator,
            targets,
            synergy,
            duration,
            outcomes,
        } => {
            let outcomes = output::parse_json_arg("outcomes", &outcomes)?;
            let initiator = agent_id(store, &initiator)?;
            let targets = targets
                .iter()
                .map(|t| agent_id(store, t.trim()))
                .collect::<Result<Vec<_>, _>>()?;
            let record = record_interaction(store, ctx, &initiator, &targets, synergy, duration, outcomes)?;
            output::emit("record.interaction", "interaction", &record)
        }
        RecordCommand::Cycle {
            cycle_id,
            phases,
            metrics,
            validation,
            success,
            duration,
            error,
        } => {
            let validation = match output::parse_json_arg("validation", &validation)? {
                JsonValue::Array(items) => items,
                other => vec![other],
            };
            let input = NewEvolutionCycle {
                cycle_id,
                phases: parse_phases(&phases)?,
                metrics_analysis: output::parse_json_arg("metrics", &metrics)?,
                validation,
                success,
                duration_seconds: duration,
                error,
            };
            let cycle = evolution::record_evolution_cycle(store, ctx, input)?;
            output::emit("record.cycle", "cycle", &cycle)
        }
        RecordCommand::Validation {
            agent,
            improvement,
            passed,
            p_value,
            details,
        } => {
            let details = output::parse_json_arg("details", &details)?;
            let id = agent_id(store, &agent)?;
            let result =
                evolution::record_validation_result(store, ctx, &id, improvement, passed, p_value, details)?;
            output::emit("record.validation", "validation", &result)
        }
        RecordCommand::Milestone {
            agent,
            title,
            description,
            achieved,
        } => {
            let milestone = match (achieved, agent, title) {
                (Some(milestone_id), _, _) => evolution::mark_milestone_achieved(store, ctx, &milestone_id)?,
                (None, Some(agent), Some(title)) => {
                    let id = agent_id(store, &agent)?;
                    evolution::record_milestone(store, ctx, &id, &title, &description)?
                }
                _ => {
                    return Err(LedgerError::ValidationError(
                        "a milestone needs --agent and --title, or --achieved <id>".to_string(),
                    ));
                }
            };
            output::emit("record.milestone", "milestone", &milestone)
        }
        RecordCommand::Capability {
            agent,
            name,
            level,
            details,
        } => {
            let details = output::parse_json_arg("details", &details)?;
            let id = agent_id(store, &agent)?;
            let capability = evolution::record_capability(store, ctx, &id, &name, level, details)?;
            output::emit("record.capability", "capability", &capability)
        }
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "record",
        "version": "0.1.0",
        "description": "Record agent telemetry (audited)",
        "commands": [
            { "name": "metric", "parameters": ["agent", "name", "value", "baseline", "metadata"] },
            { "name": "security", "parameters": ["agent", "severity", "score", "threats", "containment"] },
            { "name": "interaction", "parameters": ["initiator", "targets", "synergy", "duration", "outcomes"] },
            { "name": "validation", "parameters": ["agent", "improvement", "passed", "p_value", "details"] },
            { "name": "milestone", "parameters": ["agent", "title", "description", "achieved"] },
            { "name": "capability", "parameters": ["agent", "name", "level", "details"] }
        ],
        "storage": ["ledger.db"]
    })
}

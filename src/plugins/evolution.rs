//! Evolution cycle outcomes and the records agents accumulate across cycles:
//! validation results, milestones and capabilities.

use crate::core::broker::DbBroker;
use crate::core::capture::{Snapshot, WriteContext};
use crate::core::entity::{self, FieldMap};
use crate::core::error::LedgerError;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::agents::{self, DEFAULT_ACTOR};
use crate::plugins::telemetry::create_for_agent;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

/// Per-agent phase outputs of one cycle. Opaque to the ledger.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CyclePhases {
    pub core: JsonValue,
    pub learn: JsonValue,
    pub guard: JsonValue,
}

/// Input for [`record_evolution_cycle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvolutionCycle {
    pub cycle_id: String,
    #[serde(default)]
    pub phases: CyclePhases,
    #[serde(default)]
    pub metrics_analysis: JsonValue,
    #[serde(default)]
    pub validation: Vec<JsonValue>,
    pub success: bool,
    pub duration_seconds: f64,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionCycle {
    pub id: String,
    pub cycle_id: String,
    pub phases: CyclePhases,
    pub metrics_analysis: JsonValue,
    pub validation_results: Vec<JsonValue>,
    pub success: bool,
    pub duration_seconds: f64,
    pub error: Option<String>,
    pub created_at: i64,
}

impl Snapshot for EvolutionCycle {
    fn kind(&self) -> &'static str {
        schemas::EVOLUTION_CYCLES
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn snapshot(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("id".into(), json!(self.id));
        fields.insert("cycle_id".into(), json!(self.cycle_id));
        fields.insert("core_phase".into(), json!(self.phases.core.to_string()));
        fields.insert("learn_phase".into(), json!(self.phases.learn.to_string()));
        fields.insert("guard_phase".into(), json!(self.phases.guard.to_string()));
        fields.insert("metrics_analysis".into(), json!(self.metrics_analysis.to_string()));
        fields.insert(
            "validation_results".into(),
            json!(json!(self.validation_results).to_string()),
        );
        fields.insert("success".into(), json!(i64::from(self.success)));
        fields.insert("duration_seconds".into(), json!(self.duration_seconds));
        fields.insert("error".into(), json!(self.error));
        fields.insert("created_at".into(), json!(self.created_at));
        fields
    }
}

const CYCLE_COLUMNS: &str = "id, cycle_id, core_phase, learn_phase, guard_phase, metrics_analysis, validation_results, success, duration_seconds, error, created_at";

fn cycle_from_row(row: &Row<'_>) -> rusqlite::Result<EvolutionCycle> {
    let validation = entity::json_column(row, 6)?;
    Ok(EvolutionCycle {
        id: row.get(0)?,
        cycle_id: row.get(1)?,
        phases: CyclePhases {
            core: entity::json_column(row, 2)?,
            learn: entity::json_column(row, 3)?,
            guard: entity::json_column(row, 4)?,
        },
        metrics_analysis: entity::json_column(row, 5)?,
        validation_results: match validation {
            JsonValue::Array(items) => items,
            JsonValue::Null => Vec::new(),
            other => vec![other],
        },
        success: row.get(7)?,
        duration_seconds: row.get(8)?,
        error: row.get(9)?,
        created_at: row.get(10)?,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub id: String,
    pub agent_id: String,
    pub improvement_percentage: f64,
    pub passed: bool,
    pub p_value: Option<f64>,
    pub details: JsonValue,
    pub created_at: i64,
}

impl Snapshot for ValidationResult {
    fn kind(&self) -> &'static str {
        schemas::VALIDATION_RESULTS
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn snapshot(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("id".into(), json!(self.id));
        fields.insert("agent_id".into(), json!(self.agent_id));
        fields.insert("improvement_percentage".into(), json!(self.improvement_percentage));
        fields.insert("passed".into(), json!(i64::from(self.passed)));
        fields.insert("p_value".into(), json!(self.p_value));
        fields.insert("details".into(), json!(self.details.to_string()));
        fields.insert("created_at".into(), json!(self.created_at));
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub agent_id: String,
    pub title: String,
    pub description: String,
    pub achieved: bool,
    pub created_at: i64,
}

impl Snapshot for Milestone {
    fn kind(&self) -> &'static str {
        schemas::MILESTONES
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn snapshot(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("id".into(), json!(self.id));
        fields.insert("agent_id".into(), json!(self.agent_id));
        fields.insert("title".into(), json!(self.title));
        fields.insert("description".into(), json!(self.description));
        fields.insert("achieved".into(), json!(i64::from(self.achieved)));
        fields.insert("created_at".into(), json!(self.created_at));
        fields
    }
}

fn milestone_from_row(row: &Row<'_>) -> rusqlite::Result<Milestone> {
    Ok(Milestone {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        achieved: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub id: String,
    pub agent_id: String,
    pub name: String,
    pub level: f64,
    pub details: JsonValue,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Snapshot for Capability {
    fn kind(&self) -> &'static str {
        schemas::CAPABILITIES
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn snapshot(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("id".into(), json!(self.id));
        fields.insert("agent_id".into(), json!(self.agent_id));
        fields.insert("name".into(), json!(self.name));
        fields.insert("level".into(), json!(self.level));
        fields.insert("details".into(), json!(self.details.to_string()));
        fields.insert("created_at".into(), json!(self.created_at));
        fields.insert("updated_at".into(), json!(self.updated_at));
        fields
    }
}

const CAPABILITY_COLUMNS: &str = "id, agent_id, name, level, details, created_at, updated_at";

fn capability_from_row(row: &Row<'_>) -> rusqlite::Result<Capability> {
    Ok(Capability {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        name: row.get(2)?,
        level: row.get(3)?,
        details: entity::json_column(row, 4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn validate_unit_interval(field: &str, value: f64) -> Result<(), LedgerError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(LedgerError::ValidationError(format!(
            "{} must be within [0, 1], got {}",
            field, value
        )))
    }
}

fn validate_text(field: &str, value: &str) -> Result<(), LedgerError> {
    if value.trim().is_empty() {
        Err(LedgerError::ValidationError(format!("{} must not be empty", field)))
    } else {
        Ok(())
    }
}

pub fn record_evolution_cycle(
    store: &Store,
    ctx: &WriteContext,
    input: NewEvolutionCycle,
) -> Result<EvolutionCycle, LedgerError> {
    validate_text("cycle_id", &input.cycle_id)?;
    if !input.duration_seconds.is_finite() || input.duration_seconds < 0.0 {
        return Err(LedgerError::ValidationError(
            "duration_seconds must be a non-negative number".to_string(),
        ));
    }

    let cycle = EvolutionCycle {
        id: time::new_event_id(),
        cycle_id: input.cycle_id.trim().to_string(),
        phases: input.phases,
        metrics_analysis: input.metrics_analysis,
        validation_results: input.validation,
        success: input.success,
        duration_seconds: input.duration_seconds,
        error: input.error.filter(|e| !e.is_empty()),
        created_at: ctx.now,
    };

    let broker = DbBroker::new(&store.root);
    let capture = store.capture();
    broker.with_conn(&store.db_path(), ctx.actor_or(DEFAULT_ACTOR), "evolution.record_cycle", |conn| {
        let taken: Option<String> = conn
            .query_row(
                "SELECT id FROM evolution_cycles WHERE cycle_id = ?1",
                params![cycle.cycle_id],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(LedgerError::ValidationError(format!(
                "Evolution cycle {} already recorded",
                cycle.cycle_id
            )));
        }
        capture.create(conn, &cycle, ctx)?;
        Ok(())
    })?;
    Ok(cycle)
}

/// Most recent cycles first.
pub fn list_evolution_cycles(store: &Store, limit: usize) -> Result<Vec<EvolutionCycle>, LedgerError> {
    let broker = DbBroker::new(&store.root);
    broker.with_read(&store.db_path(), "evolution.list_cycles", |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM evolution_cycles ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            CYCLE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit as i64], cycle_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

pub fn record_validation_result(
    store: &Store,
    ctx: &WriteContext,
    agent_id: &str,
    improvement_percentage: f64,
    passed: bool,
    p_value: Option<f64>,
    details: JsonValue,
) -> Result<ValidationResult, LedgerError> {
    validate_text("agent_id", agent_id)?;
    if !improvement_percentage.is_finite() {
        return Err(LedgerError::ValidationError(
            "improvement_percentage must be a finite number".to_string(),
        ));
    }
    if let Some(p) = p_value {
        validate_unit_interval("p_value", p)?;
    }

    let result = ValidationResult {
        id: time::new_event_id(),
        agent_id: agent_id.to_string(),
        improvement_percentage,
        passed,
        p_value,
        details,
        created_at: ctx.now,
    };
    create_for_agent(store, ctx, agent_id, "evolution.record_validation", &result)?;
    Ok(result)
}

pub fn record_milestone(
    store: &Store,
    ctx: &WriteContext,
    agent_id: &str,
    title: &str,
    description: &str,
) -> Result<Milestone, LedgerError> {
    validate_text("agent_id", agent_id)?;
    validate_text("title", title)?;

    let milestone = Milestone {
        id: time::new_event_id(),
        agent_id: agent_id.to_string(),
        title: title.trim().to_string(),
        description: description.to_string(),
        achieved: false,
        created_at: ctx.now,
    };
    create_for_agent(store, ctx, agent_id, "evolution.record_milestone", &milestone)?;
    Ok(milestone)
}

pub fn mark_milestone_achieved(
    store: &Store,
    ctx: &WriteContext,
    milestone_id: &str,
) -> Result<Milestone, LedgerError> {
    let broker = DbBroker::new(&store.root);
    let capture = store.capture();
    broker.with_conn(&store.db_path(), ctx.actor_or(DEFAULT_ACTOR), "evolution.achieve_milestone", |conn| {
        let mut patch = FieldMap::new();
        patch.insert("achieved".into(), json!(1));
        capture.update(conn, schemas::MILESTONES, milestone_id, &patch, ctx)?;
        Ok(conn.query_row(
            "SELECT id, agent_id, title, description, achieved, created_at FROM milestones WHERE id = ?1",
            params![milestone_id],
            milestone_from_row,
        )?)
    })
}

fn find_capability(conn: &Connection, agent_id: &str, name: &str) -> Result<Option<Capability>, LedgerError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM capabilities WHERE agent_id = ?1 AND name = ?2",
                CAPABILITY_COLUMNS
            ),
            params![agent_id, name],
            capability_from_row,
        )
        .optional()?)
}

/// Create the named capability of an agent, or update its level and details
/// when it already exists.
pub fn record_capability(
    store: &Store,
    ctx: &WriteContext,
    agent_id: &str,
    name: &str,
    level: f64,
    details: JsonValue,
) -> Result<Capability, LedgerError> {
    validate_text("agent_id", agent_id)?;
    validate_text("capability name", name)?;
    validate_unit_interval("level", level)?;
    let name = name.trim();

    let broker = DbBroker::new(&store.root);
    let capture = store.capture();
    broker.with_conn(&store.db_path(), ctx.actor_or(DEFAULT_ACTOR), "evolution.record_capability", |conn| {
        agents::ensure_agent_id(conn, agent_id)?;
        match find_capability(conn, agent_id, name)? {
            Some(existing) => {
                let mut patch = FieldMap::new();
                patch.insert("level".into(), json!(level));
                patch.insert("details".into(), json!(details.to_string()));
                patch.insert("updated_at".into(), json!(ctx.now));
                capture.update(conn, schemas::CAPABILITIES, &existing.id, &patch, ctx)?;
            }
            None => {
                let capability = Capability {
                    id: time::new_event_id(),
                    agent_id: agent_id.to_string(),
                    name: name.to_string(),
                    level,
                    details: details.clone(),
                    created_at: ctx.now,
                    updated_at: ctx.now,
                };
                capture.create(conn, &capability, ctx)?;
            }
        }
        find_capability(conn, agent_id, name)?
            .ok_or_else(|| LedgerError::NotFound(format!("capability {}/{}", agent_id, name)))
    })
}

pub fn list_capabilities(store: &Store, agent: &str) -> Result<Vec<Capability>, LedgerError> {
    let broker = DbBroker::new(&store.root);
    broker.with_read(&store.db_path(), "evolution.list_capabilities", |conn| {
        let agent = agents::require_agent(conn, agent)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM capabilities WHERE agent_id = ?1 ORDER BY name",
            CAPABILITY_COLUMNS
        ))?;
        let rows = stmt.query_map(params![agent.id], capability_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "cycle",
        "version": "0.1.0",
        "description": "Record evolution cycles and their validation outcomes (audited)",
        "commands": [
            { "name": "cycle", "parameters": ["cycle_id", "phases", "metrics", "validation", "success", "duration", "error"] }
        ],
        "storage": ["ledger.db"]
    })
}

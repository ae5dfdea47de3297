//! Agent registry.
//!
//! Agents are ordinary audited entities. Only agents whose status is
//! `active` take part in the aggregation views and the health score.

use crate::core::broker::DbBroker;
use crate::core::capture::{Snapshot, WriteContext};
use crate::core::entity::{self, FieldMap};
use crate::core::error::LedgerError;
use crate::core::output;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use clap::Subcommand;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_ACTOR: &str = "evoledger";

/// The fleet registered by `evoledger init`.
pub const DEFAULT_FLEET: &[(&str, &str)] = &[
    ("CORE", "self_improving"),
    ("LEARN", "collaborative"),
    ("GUARD", "security"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Inactive,
    Suspended,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Inactive => "inactive",
            AgentStatus::Suspended => "suspended",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(AgentStatus::Active),
            "inactive" => Ok(AgentStatus::Inactive),
            "suspended" => Ok(AgentStatus::Suspended),
            other => Err(LedgerError::ValidationError(format!(
                "Unknown agent status: {} (expected active|inactive|suspended)",
                other
            ))),
        }
    }
}

impl FromSql for AgentStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()
            .and_then(|s| s.parse::<Self>().map_err(|e| FromSqlError::Other(Box::new(e))))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub agent_type: String,
    pub status: AgentStatus,
    pub config: JsonValue,
    pub state: JsonValue,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Snapshot for Agent {
    fn kind(&self) -> &'static str {
        schemas::AGENTS
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn snapshot(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("id".into(), json!(self.id));
        fields.insert("name".into(), json!(self.name));
        fields.insert("agent_type".into(), json!(self.agent_type));
        fields.insert("status".into(), json!(self.status.as_str()));
        fields.insert("config".into(), json!(self.config.to_string()));
        fields.insert("state".into(), json!(self.state.to_string()));
        fields.insert("created_at".into(), json!(self.created_at));
        fields.insert("updated_at".into(), json!(self.updated_at));
        fields
    }
}

const AGENT_COLUMNS: &str = "id, name, agent_type, status, config, state, created_at, updated_at";

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        name: row.get(1)?,
        agent_type: row.get(2)?,
        status: row.get(3)?,
        config: entity::json_column(row, 4)?,
        state: entity::json_column(row, 5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn validate_name(name: &str) -> Result<(), LedgerError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(LedgerError::ValidationError(format!(
            "Invalid agent name {:?}: use letters, digits, '_' or '-', starting with a letter",
            name
        )))
    }
}

fn require_object(field: &str, value: &JsonValue) -> Result<(), LedgerError> {
    if value.is_object() {
        Ok(())
    } else {
        Err(LedgerError::ValidationError(format!(
            "{} must be a JSON object",
            field
        )))
    }
}

/// Look up an agent by id or name inside an open transaction.
pub fn lookup_agent(conn: &Connection, id_or_name: &str) -> Result<Option<Agent>, LedgerError> {
    let sql = format!(
        "SELECT {} FROM agents WHERE id = ?1 OR name = ?1 LIMIT 1",
        AGENT_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![id_or_name], agent_from_row)
        .optional()?)
}

/// Like [`lookup_agent`] but a missing agent is an error.
pub fn require_agent(conn: &Connection, id_or_name: &str) -> Result<Agent, LedgerError> {
    lookup_agent(conn, id_or_name)?
        .ok_or_else(|| LedgerError::NotFound(format!("agent {}", id_or_name)))
}

/// Fail with `NotFound` unless an agent with exactly this id exists.
pub fn ensure_agent_id(conn: &Connection, agent_id: &str) -> Result<(), LedgerError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM agents WHERE id = ?1)",
        params![agent_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(LedgerError::NotFound(format!("agent {}", agent_id)))
    }
}

pub fn register_agent(
    store: &Store,
    ctx: &WriteContext,
    name: &str,
    agent_type: &str,
    config: JsonValue,
) -> Result<Agent, LedgerError> {
    validate_name(name)?;
    if agent_type.trim().is_empty() {
        return Err(LedgerError::ValidationError(
            "agent_type must not be empty".to_string(),
        ));
    }
    require_object("config", &config)?;

    let agent = Agent {
        id: time::new_event_id(),
        name: name.to_string(),
        agent_type: agent_type.trim().to_string(),
        status: AgentStatus::Active,
        config,
        state: json!({}),
        created_at: ctx.now,
        updated_at: ctx.now,
    };

    let broker = DbBroker::new(&store.root);
    let capture = store.capture();
    broker.with_conn(&store.db_path(), ctx.actor_or(DEFAULT_ACTOR), "agents.register", |conn| {
        let taken: Option<String> = conn
            .query_row("SELECT id FROM agents WHERE name = ?1", params![name], |row| row.get(0))
            .optional()?;
        if let Some(existing) = taken {
            return Err(LedgerError::ValidationError(format!(
                "Agent name {} already registered as {}",
                name, existing
            )));
        }
        capture.create(conn, &agent, ctx)?;
        Ok(())
    })?;
    Ok(agent)
}

fn update_agent(
    store: &Store,
    ctx: &WriteContext,
    id_or_name: &str,
    op_name: &str,
    mut patch: FieldMap,
) -> Result<Agent, LedgerError> {
    patch.insert("updated_at".into(), json!(ctx.now));
    let broker = DbBroker::new(&store.root);
    let capture = store.capture();
    broker.with_conn(&store.db_path(), ctx.actor_or(DEFAULT_ACTOR), op_name, |conn| {
        let agent = require_agent(conn, id_or_name)?;
        capture.update(conn, schemas::AGENTS, &agent.id, &patch, ctx)?;
        require_agent(conn, &agent.id)
    })
}

pub fn set_agent_status(
    store: &Store,
    ctx: &WriteContext,
    id_or_name: &str,
    status: AgentStatus,
) -> Result<Agent, LedgerError> {
    let mut patch = FieldMap::new();
    patch.insert("status".into(), json!(status.as_str()));
    update_agent(store, ctx, id_or_name, "agents.set_status", patch)
}

/// Replace the opaque state blob an agent persists between cycles.
pub fn update_agent_state(
    store: &Store,
    ctx: &WriteContext,
    id_or_name: &str,
    state: JsonValue,
) -> Result<Agent, LedgerError> {
    require_object("state", &state)?;
    let mut patch = FieldMap::new();
    patch.insert("state".into(), json!(state.to_string()));
    update_agent(store, ctx, id_or_name, "agents.update_state", patch)
}

/// Delete an agent. Agents that still own telemetry cannot be removed; set
/// them inactive instead.
pub fn remove_agent(
    store: &Store,
    ctx: &WriteContext,
    id_or_name: &str,
) -> Result<Agent, LedgerError> {
    let broker = DbBroker::new(&store.root);
    let capture = store.capture();
    broker.with_conn(&store.db_path(), ctx.actor_or(DEFAULT_ACTOR), "agents.remove", |conn| {
        let agent = require_agent(conn, id_or_name)?;
        let owned: i64 = conn.query_row(
            "SELECT (SELECT COUNT(*) FROM performance_metrics WHERE agent_id = ?1)
                  + (SELECT COUNT(*) FROM security_logs WHERE agent_id = ?1)
                  + (SELECT COUNT(*) FROM agent_interactions WHERE initiator_agent_id = ?1)
                  + (SELECT COUNT(*) FROM validation_results WHERE agent_id = ?1)
                  + (SELECT COUNT(*) FROM milestones WHERE agent_id = ?1)
                  + (SELECT COUNT(*) FROM capabilities WHERE agent_id = ?1)",
            params![agent.id],
            |row| row.get(0),
        )?;
        if owned > 0 {
            return Err(LedgerError::ValidationError(format!(
                "Agent {} still owns {} records; set it inactive instead",
                agent.name, owned
            )));
        }
        capture.delete(conn, schemas::AGENTS, &agent.id, ctx)?;
        Ok(agent)
    })
}

pub fn get_agent(store: &Store, id_or_name: &str) -> Result<Agent, LedgerError> {
    let broker = DbBroker::new(&store.root);
    broker.with_read(&store.db_path(), "agents.get", |conn| require_agent(conn, id_or_name))
}

pub fn find_agent_by_name(store: &Store, name: &str) -> Result<Option<Agent>, LedgerError> {
    let broker = DbBroker::new(&store.root);
    broker.with_read(&store.db_path(), "agents.find", |conn| {
        let sql = format!("SELECT {} FROM agents WHERE name = ?1", AGENT_COLUMNS);
        Ok(conn.query_row(&sql, params![name], agent_from_row).optional()?)
    })
}

pub fn list_agents(store: &Store) -> Result<Vec<Agent>, LedgerError> {
    let broker = DbBroker::new(&store.root);
    broker.with_read(&store.db_path(), "agents.list", |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM agents ORDER BY name",
            AGENT_COLUMNS
        ))?;
        let rows = stmt.query_map([], agent_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

/// Register any member of [`DEFAULT_FLEET`] not already present.
pub fn seed_default_fleet(store: &Store, ctx: &WriteContext) -> Result<Vec<Agent>, LedgerError> {
    let mut created = Vec::new();
    for (name, agent_type) in DEFAULT_FLEET {
        if find_agent_by_name(store, name)?.is_none() {
            created.push(register_agent(store, ctx, name, agent_type, json!({}))?);
        }
    }
    Ok(created)
}

#[derive(clap::Args, Debug)]
pub struct AgentCli {
    #[clap(subcommand)]
    pub command: AgentCommand,
}

#[derive(Subcommand, Debug)]
pub enum AgentCommand {
    /// Register a new active agent.
    Register {
        #[clap(long)]
        name: String,
        #[clap(long = "type")]
        agent_type: String,
        /// Agent configuration as a JSON object.
        #[clap(long, default_value = "{}")]
        config: String,
    },
    /// Change an agent's status (active, inactive, suspended).
    Status {
        /// Agent id or name.
        agent: String,
        status: AgentStatus,
    },
    /// Replace an agent's persisted state blob.
    State {
        agent: String,
        /// State as a JSON object.
        state: String,
    },
    /// Delete an agent that owns no records.
    Remove { agent: String },
    /// List every registered agent.
    List,
}

pub fn run_agent_cli(store: &Store, ctx: &WriteContext, cli: AgentCli) -> Result<(), LedgerError> {
    match cli.command {
        AgentCommand::Register {
            name,
            agent_type,
            config,
        } => {
            let config = output::parse_json_arg("config", &config)?;
            let agent = register_agent(store, ctx, &name, &agent_type, config)?;
            output::emit("agent.register", "agent", &agent)
        }
        AgentCommand::Status { agent, status } => {
            let agent = set_agent_status(store, ctx, &agent, status)?;
            output::emit("agent.status", "agent", &agent)
        }
        AgentCommand::State { agent, state } => {
            let state = output::parse_json_arg("state", &state)?;
            let agent = update_agent_state(store, ctx, &agent, state)?;
            output::emit("agent.state", "agent", &agent)
        }
        AgentCommand::Remove { agent } => {
            let agent = remove_agent(store, ctx, &agent)?;
            output::emit("agent.remove", "agent", &agent)
        }
        AgentCommand::List => output::emit("agent.list", "agents", &list_agents(store)?),
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "agent",
        "version": "0.1.0",
        "description": "Register agents and manage their status",
        "commands": [
            { "name": "register", "parameters": ["name", "type", "config"] },
            { "name": "status", "parameters": ["agent", "status"] },
            { "name": "state", "parameters": ["agent", "state"] },
            { "name": "remove", "parameters": ["agent"] },
            { "name": "list" }
        ],
        "storage": ["ledger.db"]
    })
}

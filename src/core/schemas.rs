//! Centralized database schema definitions for the ledger.
//!
//! All state lives in one SQLite database (`ledger.db`) under the store root:
//! 1. Entity tables: agents and everything agents produce.
//! 2. `audit_log`: one row per captured mutation, shared by every entity kind.
//!
//! Every table carries `created_at INTEGER` (unix-epoch seconds); the
//! retention sweeper and the aggregation views key off it.

pub const LEDGER_DB_NAME: &str = "ledger.db";
pub const CONFIG_FILE_NAME: &str = "config.toml";

// --- Entity kinds (table names) ---
pub const AGENTS: &str = "agents";
pub const PERFORMANCE_METRICS: &str = "performance_metrics";
pub const SECURITY_LOGS: &str = "security_logs";
pub const AGENT_INTERACTIONS: &str = "agent_interactions";
pub const EVOLUTION_CYCLES: &str = "evolution_cycles";
pub const VALIDATION_RESULTS: &str = "validation_results";
pub const MILESTONES: &str = "milestones";
pub const CAPABILITIES: &str = "capabilities";
pub const AUDIT_LOG: &str = "audit_log";

/// Every table the generic entity layer may address.
pub const ENTITY_KINDS: &[&str] = &[
    AGENTS,
    PERFORMANCE_METRICS,
    SECURITY_LOGS,
    AGENT_INTERACTIONS,
    EVOLUTION_CYCLES,
    VALIDATION_RESULTS,
    MILESTONES,
    CAPABILITIES,
];

/// Operational telemetry pruned on the short retention horizon.
pub const OPERATIONAL_KINDS: &[&str] = &[PERFORMANCE_METRICS, SECURITY_LOGS, AGENT_INTERACTIONS];

pub const LEDGER_DB_SCHEMA_AGENTS: &str = "
    CREATE TABLE IF NOT EXISTS agents (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        agent_type TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'inactive', 'suspended')),
        config TEXT NOT NULL DEFAULT '{}',
        state TEXT NOT NULL DEFAULT '{}',
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
";

pub const LEDGER_DB_SCHEMA_PERFORMANCE_METRICS: &str = "
    CREATE TABLE IF NOT EXISTS performance_metrics (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        metric_name TEXT NOT NULL,
        current_value REAL NOT NULL,
        baseline_value REAL,
        improvement_percentage REAL,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at INTEGER NOT NULL,
        FOREIGN KEY(agent_id) REFERENCES agents(id)
    )
";

pub const LEDGER_DB_SCHEMA_SECURITY_LOGS: &str = "
    CREATE TABLE IF NOT EXISTS security_logs (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        severity TEXT NOT NULL CHECK (severity IN ('LOW', 'MEDIUM', 'HIGH', 'CRITICAL')),
        security_score REAL NOT NULL CHECK (security_score >= 0.0 AND security_score <= 1.0),
        threats_detected INTEGER NOT NULL DEFAULT 0,
        containment_actions INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        FOREIGN KEY(agent_id) REFERENCES agents(id)
    )
";

pub const LEDGER_DB_SCHEMA_AGENT_INTERACTIONS: &str = "
    CREATE TABLE IF NOT EXISTS agent_interactions (
        id TEXT PRIMARY KEY,
        initiator_agent_id TEXT NOT NULL,
        target_agents TEXT NOT NULL, -- JSON array of agent ids
        synergy_score REAL NOT NULL,
        duration_seconds REAL NOT NULL,
        outcomes TEXT NOT NULL DEFAULT '{}',
        created_at INTEGER NOT NULL,
        FOREIGN KEY(initiator_agent_id) REFERENCES agents(id)
    )
";

pub const LEDGER_DB_SCHEMA_EVOLUTION_CYCLES: &str = "
    CREATE TABLE IF NOT EXISTS evolution_cycles (
        id TEXT PRIMARY KEY,
        cycle_id TEXT NOT NULL UNIQUE,
        core_phase TEXT NOT NULL DEFAULT 'null',
        learn_phase TEXT NOT NULL DEFAULT 'null',
        guard_phase TEXT NOT NULL DEFAULT 'null',
        metrics_analysis TEXT NOT NULL DEFAULT 'null',
        validation_results TEXT NOT NULL DEFAULT '[]',
        success INTEGER NOT NULL,
        duration_seconds REAL NOT NULL,
        error TEXT,
        created_at INTEGER NOT NULL
    )
";

pub const LEDGER_DB_SCHEMA_VALIDATION_RESULTS: &str = "
    CREATE TABLE IF NOT EXISTS validation_results (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        improvement_percentage REAL NOT NULL,
        passed INTEGER NOT NULL,
        p_value REAL,
        details TEXT NOT NULL DEFAULT '{}',
        created_at INTEGER NOT NULL,
        FOREIGN KEY(agent_id) REFERENCES agents(id)
    )
";

pub const LEDGER_DB_SCHEMA_MILESTONES: &str = "
    CREATE TABLE IF NOT EXISTS milestones (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        achieved INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        FOREIGN KEY(agent_id) REFERENCES agents(id)
    )
";

pub const LEDGER_DB_SCHEMA_CAPABILITIES: &str = "
    CREATE TABLE IF NOT EXISTS capabilities (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        name TEXT NOT NULL,
        level REAL NOT NULL CHECK (level >= 0.0 AND level <= 1.0),
        details TEXT NOT NULL DEFAULT '{}',
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        UNIQUE(agent_id, name),
        FOREIGN KEY(agent_id) REFERENCES agents(id)
    )
";

pub const LEDGER_DB_SCHEMA_AUDIT_LOG: &str = "
    CREATE TABLE IF NOT EXISTS audit_log (
        id TEXT PRIMARY KEY,
        entity_kind TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        action TEXT NOT NULL CHECK (action IN ('CREATE', 'UPDATE', 'DELETE')),
        old_values TEXT, -- JSON object, absent on CREATE
        new_values TEXT, -- JSON object, absent on DELETE
        actor TEXT,
        created_at INTEGER NOT NULL
    )
";

pub const LEDGER_DB_SCHEMA_INDEXES: &str = "
    CREATE INDEX IF NOT EXISTS idx_agents_status ON agents(status);
    CREATE INDEX IF NOT EXISTS idx_performance_metrics_agent ON performance_metrics(agent_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_performance_metrics_created ON performance_metrics(created_at);
    CREATE INDEX IF NOT EXISTS idx_security_logs_agent ON security_logs(agent_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_security_logs_created ON security_logs(created_at);
    CREATE INDEX IF NOT EXISTS idx_agent_interactions_initiator ON agent_interactions(initiator_agent_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_agent_interactions_created ON agent_interactions(created_at);
    CREATE INDEX IF NOT EXISTS idx_validation_results_agent ON validation_results(agent_id);
    CREATE INDEX IF NOT EXISTS idx_audit_log_entity ON audit_log(entity_kind, entity_id);
    CREATE INDEX IF NOT EXISTS idx_audit_log_created ON audit_log(created_at);
";

/// Table definitions in creation order (referenced tables first).
pub const LEDGER_DB_TABLES: &[&str] = &[
    LEDGER_DB_SCHEMA_AGENTS,
    LEDGER_DB_SCHEMA_PERFORMANCE_METRICS,
    LEDGER_DB_SCHEMA_SECURITY_LOGS,
    LEDGER_DB_SCHEMA_AGENT_INTERACTIONS,
    LEDGER_DB_SCHEMA_EVOLUTION_CYCLES,
    LEDGER_DB_SCHEMA_VALIDATION_RESULTS,
    LEDGER_DB_SCHEMA_MILESTONES,
    LEDGER_DB_SCHEMA_CAPABILITIES,
    LEDGER_DB_SCHEMA_AUDIT_LOG,
];

pub fn is_entity_kind(kind: &str) -> bool {
    ENTITY_KINDS.contains(&kind)
}

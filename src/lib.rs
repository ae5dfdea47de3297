//! evoledger: an audited ledger for a fleet of self-evolving agents.
//!
//! The ledger records what agents produce across evolution cycles
//! (performance samples, security events, collaboration interactions, cycle
//! outcomes) and keeps a generic audit trail of every row-level change.
//!
//! # Architecture
//!
//! ## Store
//!
//! - **Project store** (`<project>/.evoledger/data/`): `ledger.db` plus an
//!   optional `config.toml`.
//!
//! ## The Thin Waist
//!
//! All writes route through `DbBroker`, one `IMMEDIATE` transaction each.
//! Inside it the `ChangeCapture` engine applies the mutation and appends its
//! audit record, so both commit or neither does.
//!
//! ## Subsystems (Plugins)
//!
//! - `agents`: agent registry (CORE, LEARN, GUARD, ...)
//! - `telemetry`: performance, security and interaction records
//! - `evolution`: cycle outcomes, validations, milestones, capabilities
//! - `views`: per-agent aggregation views over active agents
//! - `health`: weighted system health score and alerts
//! - `retention`: batched retention sweeps
//! - `audit`: audit trail queries
//!
//! # Examples
//!
//! ```bash
//! evoledger init
//! evoledger record metric --agent CORE --name accuracy --value 0.82 --baseline 0.75
//! evoledger health --format json
//! evoledger sweep --retention-days 30
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: store, broker, generic row layer, change capture
//! - [`plugins`]: subsystem implementations

pub mod core;
pub mod plugins;

use crate::core::{
    capture::WriteContext,
    config::LedgerConfig,
    db, error, logging, output, schemas,
    store::Store,
    time,
};
use crate::plugins::{agents, audit, evolution, health, retention, telemetry, views};

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Project marker directory.
pub const PROJECT_DIR: &str = ".evoledger";

#[derive(Parser, Debug)]
#[clap(
    name = "evoledger",
    version = env!("CARGO_PKG_VERSION"),
    about = "Audited ledger for self-evolving agents"
)]
struct Cli {
    /// Actor recorded on audit entries written by this command.
    #[clap(long, global = true)]
    actor: Option<String>,
    /// Emit logs as JSON lines on stderr.
    #[clap(long, global = true)]
    log_json: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct InitCli {
    /// Directory to initialize (defaults to current working directory).
    #[clap(short, long)]
    dir: Option<PathBuf>,
    /// Rewrite `config.toml` with defaults even if it exists.
    #[clap(long)]
    force: bool,
    /// Do not register the default CORE/LEARN/GUARD fleet.
    #[clap(long)]
    no_seed: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the project store and register the default fleet
    Init(InitCli),

    /// Agent registry
    Agent(agents::AgentCli),

    /// Record telemetry and cycle outcomes (audited)
    Record(telemetry::RecordCli),

    /// Per-agent aggregation views
    View(views::ViewCli),

    /// System health score and alerts
    Health(health::HealthCli),

    /// Audit trail, newest first
    Audit(audit::AuditCli),

    /// Delete aged telemetry and audit rows
    Sweep(retention::SweepCli),

    /// Subsystem schemas and discovery
    Schema,

    /// Print version
    Version,
}

fn find_project_root(start_dir: &Path) -> Result<PathBuf, error::LedgerError> {
    let mut current_dir = PathBuf::from(start_dir);
    loop {
        if current_dir.join(PROJECT_DIR).is_dir() {
            return Ok(current_dir);
        }
        if !current_dir.pop() {
            return Err(error::LedgerError::NotFound(format!(
                "'{}' directory not found in current or parent directories. Run `evoledger init` first.",
                PROJECT_DIR
            )));
        }
    }
}

/// Store root for a project directory.
pub fn project_store_root(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_DIR).join("data")
}

/// Create (or re-open) the store under `project_root`: writes a default
/// `config.toml` when missing and creates every table.
pub fn init_project(project_root: &Path, force: bool) -> Result<Store, error::LedgerError> {
    let store_root = project_store_root(project_root);
    fs::create_dir_all(&store_root)?;
    let config_path = store_root.join(schemas::CONFIG_FILE_NAME);
    if force || !config_path.exists() {
        fs::write(&config_path, LedgerConfig::default().to_toml_string()?)?;
        info!(path = %config_path.display(), "wrote default config");
    }
    db::initialize_ledger_db(&store_root)?;
    Store::open(store_root)
}

fn schema_catalog() -> serde_json::Value {
    serde_json::json!({
        "subsystems": [
            agents::schema(),
            telemetry::schema(),
            evolution::schema(),
            views::schema(),
            health::schema(),
            audit::schema(),
            retention::schema()
        ]
    })
}

pub fn run() -> Result<(), error::LedgerError> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_json);

    let now = time::now_secs();
    let mut ctx = WriteContext::at(now);
    if let Some(actor) = cli.actor {
        ctx = ctx.with_actor(actor);
    }

    let current_dir = std::env::current_dir()?;
    match cli.command {
        Command::Version => {
            println!("v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Schema => output::print_json(&time::command_envelope(
            "schema",
            "ok",
            schema_catalog(),
        )),
        Command::Init(init) => {
            let target = init.dir.unwrap_or(current_dir);
            fs::create_dir_all(&target)?;
            let target = fs::canonicalize(&target)?;
            let store = init_project(&target, init.force)?;
            let seeded = if init.no_seed {
                Vec::new()
            } else {
                agents::seed_default_fleet(&store, &ctx)?
            };
            output::print_json(&time::command_envelope(
                "init",
                "ok",
                serde_json::json!({
                    "store": store.root.display().to_string(),
                    "seeded": seeded.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
                }),
            ))
        }
        command => {
            let project_root = find_project_root(&current_dir)?;
            let store_root = project_store_root(&project_root);
            let store = Store::open(&store_root)?;
            db::initialize_ledger_db(&store.root)?;

            match command {
                Command::Agent(c) => agents::run_agent_cli(&store, &ctx, c),
                Command::Record(c) => telemetry::run_record_cli(&store, &ctx, c),
                Command::View(c) => views::run_view_cli(&store, c),
                Command::Health(c) => health::run_health_cli(&store, c),
                Command::Audit(c) => audit::run_audit_cli(&store, c),
                Command::Sweep(c) => retention::run_sweep_cli(&store, now, c),
                Command::Init(_) | Command::Schema | Command::Version => Ok(()),
            }
        }
    }
}

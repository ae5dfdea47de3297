//! System health scoring.
//!
//! The score combines the three aggregation views:
//!
//! - `P`: mean of the per-agent average performance values (0.0 when none)
//! - `S`: mean of the per-agent average security scores (1.0 when none)
//! - `C`: mean of the per-agent average synergy / 100 (0.0 when none)
//!
//! `score = w_p * P + w_s * S + w_c * C`, weights from `[health]` in the
//! store configuration (0.4 / 0.4 / 0.2 by default). Sparse data degrades to
//! the defaults above; it is never an error.

use crate::core::broker::DbBroker;
use crate::core::config::{AlertThresholds, HealthWeights};
use crate::core::error::LedgerError;
use crate::core::output;
use crate::core::store::Store;
use crate::plugins::telemetry::Severity;
use crate::plugins::views::{
    self, CollaborationSummary, PerformanceSummary, SecuritySummary,
};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_PERFORMANCE: f64 = 0.0;
pub const DEFAULT_SECURITY: f64 = 1.0;
pub const DEFAULT_COLLABORATION: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthComponents {
    pub performance: f64,
    pub security: f64,
    pub collaboration: f64,
    /// Agents with a defined performance average.
    pub performance_agents: usize,
}

fn mean_defined(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { None } else { Some(sum / count as f64) }
}

pub fn health_components(
    performance: &[PerformanceSummary],
    security: &[SecuritySummary],
    collaboration: &[CollaborationSummary],
) -> HealthComponents {
    HealthComponents {
        performance: mean_defined(performance.iter().map(|p| p.avg_value))
            .unwrap_or(DEFAULT_PERFORMANCE),
        security: mean_defined(security.iter().map(|s| s.avg_score)).unwrap_or(DEFAULT_SECURITY),
        collaboration: mean_defined(collaboration.iter().map(|c| c.avg_synergy.map(|v| v / 100.0)))
            .unwrap_or(DEFAULT_COLLABORATION),
        performance_agents: performance.iter().filter(|p| p.avg_value.is_some()).count(),
    }
}

pub fn compute_health_score(components: &HealthComponents, weights: &HealthWeights) -> f64 {
    weights.performance * components.performance
        + weights.security * components.security
        + weights.collaboration * components.collaboration
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthClass {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl HealthClass {
    pub fn classify(score: f64) -> Self {
        if score >= 0.8 {
            HealthClass::Excellent
        } else if score >= 0.6 {
            HealthClass::Good
        } else if score >= 0.4 {
            HealthClass::Fair
        } else {
            HealthClass::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthClass::Excellent => "EXCELLENT",
            HealthClass::Good => "GOOD",
            HealthClass::Fair => "FAIR",
            HealthClass::Poor => "POOR",
        }
    }
}

impl fmt::Display for HealthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    PerformanceLow,
    SecurityRisk,
    CollaborationLow,
}

impl AlertKind {
    pub fn severity(&self) -> Severity {
        match self {
            AlertKind::PerformanceLow => Severity::High,
            AlertKind::SecurityRisk => Severity::Critical,
            AlertKind::CollaborationLow => Severity::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub agent_id: String,
    pub agent_name: String,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
}

fn alert(kind: AlertKind, agent_id: &str, agent_name: &str, value: f64, threshold: f64) -> Alert {
    let message = match kind {
        AlertKind::PerformanceLow => format!(
            "{} latest performance {:.3} below {:.3}",
            agent_name, value, threshold
        ),
        AlertKind::SecurityRisk => format!(
            "{} latest security score {:.3} below {:.3}",
            agent_name, value, threshold
        ),
        AlertKind::CollaborationLow => format!(
            "{} latest synergy {:.1} below {:.1}",
            agent_name, value, threshold
        ),
    };
    Alert {
        kind,
        severity: kind.severity(),
        agent_id: agent_id.to_string(),
        agent_name: agent_name.to_string(),
        value,
        threshold,
        message,
    }
}

/// Alerts from each active agent's most recent sample of every kind.
pub fn generate_alerts(
    performance: &[PerformanceSummary],
    security: &[SecuritySummary],
    collaboration: &[CollaborationSummary],
    thresholds: &AlertThresholds,
) -> Vec<Alert> {
    let mut alerts = Vec::new();
    for p in performance {
        if let Some(v) = p.last_value.filter(|v| *v < thresholds.performance_drop) {
            alerts.push(alert(
                AlertKind::PerformanceLow,
                &p.agent_id,
                &p.agent_name,
                v,
                thresholds.performance_drop,
            ));
        }
    }
    for s in security {
        if let Some(v) = s.last_score.filter(|v| *v < thresholds.security_score) {
            alerts.push(alert(
                AlertKind::SecurityRisk,
                &s.agent_id,
                &s.agent_name,
                v,
                thresholds.security_score,
            ));
        }
    }
    let synergy_floor = thresholds.collaboration_synergy * 100.0;
    for c in collaboration {
        // Compared on the 0..1 scale the threshold is configured in.
        if let Some(v) = c
            .last_synergy
            .filter(|v| *v / 100.0 < thresholds.collaboration_synergy)
        {
            alerts.push(alert(
                AlertKind::CollaborationLow,
                &c.agent_id,
                &c.agent_name,
                v,
                synergy_floor,
            ));
        }
    }
    alerts.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.agent_name.cmp(&b.agent_name)));
    alerts
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub score: f64,
    pub class: HealthClass,
    pub components: HealthComponents,
    pub weights: HealthWeights,
    pub alerts: Vec<Alert>,
    pub critical_alerts: usize,
}

/// Weighted health score over the current state of the store.
pub fn get_health_score(store: &Store) -> Result<f64, LedgerError> {
    let weights = store.config.health;
    let threshold = store.config.alerts.security_score;
    let broker = DbBroker::new(&store.root);
    broker.with_read(&store.db_path(), "health.score", |conn| {
        let performance = views::performance_summary(conn)?;
        let security = views::security_summary(conn, threshold)?;
        let collaboration = views::collaboration_summary(conn)?;
        let components = health_components(&performance, &security, &collaboration);
        Ok(compute_health_score(&components, &weights))
    })
}

pub fn get_health_report(store: &Store) -> Result<HealthReport, LedgerError> {
    let weights = store.config.health;
    let thresholds = store.config.alerts;
    let broker = DbBroker::new(&store.root);
    broker.with_read(&store.db_path(), "health.report", |conn| {
        let performance = views::performance_summary(conn)?;
        let security = views::security_summary(conn, thresholds.security_score)?;
        let collaboration = views::collaboration_summary(conn)?;

        let components = health_components(&performance, &security, &collaboration);
        let score = compute_health_score(&components, &weights);
        let alerts = generate_alerts(&performance, &security, &collaboration, &thresholds);
        let critical_alerts = alerts
            .iter()
            .filter(|a| a.severity == Severity::Critical)
            .count();
        Ok(HealthReport {
            score,
            class: HealthClass::classify(score),
            components,
            weights,
            alerts,
            critical_alerts,
        })
    })
}

#[derive(clap::Args, Debug)]
pub struct HealthCli {
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    pub format: String,
}

fn print_report(report: &HealthReport) {
    let class = match report.class {
        HealthClass::Excellent => report.class.as_str().bright_green().bold(),
        HealthClass::Good => report.class.as_str().green().bold(),
        HealthClass::Fair => report.class.as_str().yellow().bold(),
        HealthClass::Poor => report.class.as_str().red().bold(),
    };
    println!("System health: {:.3} {}", report.score, class);
    println!(
        "  performance {:.3} (w {:.2}, {} agents)",
        report.components.performance, report.weights.performance, report.components.performance_agents
    );
    println!(
        "  security    {:.3} (w {:.2})",
        report.components.security, report.weights.security
    );
    println!(
        "  synergy     {:.3} (w {:.2})",
        report.components.collaboration, report.weights.collaboration
    );
    if report.alerts.is_empty() {
        println!("  {} no alerts", "✓".green());
        return;
    }
    println!(
        "  {} alerts ({} critical)",
        report.alerts.len(),
        report.critical_alerts
    );
    for a in &report.alerts {
        let severity = match a.severity {
            Severity::Critical => a.severity.as_str().red().bold(),
            Severity::High => a.severity.as_str().red(),
            Severity::Medium => a.severity.as_str().yellow(),
            Severity::Low => a.severity.as_str().normal(),
        };
        println!("  ▸ [{}] {}", severity, output::compact_line(&a.message, 100));
    }
}

pub fn run_health_cli(store: &Store, cli: HealthCli) -> Result<(), LedgerError> {
    let report = get_health_report(store)?;
    match cli.format.as_str() {
        "json" => output::emit("health", "report", &report),
        "text" => {
            print_report(&report);
            Ok(())
        }
        other => Err(LedgerError::ValidationError(format!(
            "Unknown format: {} (expected text|json)",
            other
        ))),
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "health",
        "version": "0.1.0",
        "description": "Weighted system health score, classification and alerts",
        "commands": [
            { "name": "health", "parameters": ["format"] }
        ],
        "storage": ["ledger.db"]
    })
}

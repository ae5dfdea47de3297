//! Ledger configuration loaded from `config.toml` in the store root.
//!
//! A missing file is not an error: every section falls back to its defaults.
//!
//! ```toml
//! [retention]
//! days = 30
//! audit_extra_days = 30
//! batch_size = 500
//!
//! [health]
//! performance = 0.4
//! security = 0.4
//! collaboration = 0.2
//!
//! [alerts]
//! performance_drop = 0.2
//! security_score = 0.7
//! collaboration_synergy = 0.3
//!
//! [capture]
//! kinds = ["agents", "performance_metrics"]
//! ```

use crate::core::error::LedgerError;
use crate::core::schemas;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LedgerConfig {
    pub retention: RetentionConfig,
    pub health: HealthWeights,
    pub alerts: AlertThresholds,
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Age in days after which operational telemetry is deleted.
    pub days: i64,
    /// Additional days audit rows outlive operational rows.
    pub audit_extra_days: i64,
    /// Rows deleted per transaction during a sweep.
    pub batch_size: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: 30,
            audit_extra_days: 30,
            batch_size: 500,
        }
    }
}

/// Weights applied to the performance, security and collaboration components
/// of the system health score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthWeights {
    pub performance: f64,
    pub security: f64,
    pub collaboration: f64,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            performance: 0.4,
            security: 0.4,
            collaboration: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Latest performance value below this raises PERFORMANCE_LOW.
    pub performance_drop: f64,
    /// Latest security score below this raises SECURITY_RISK and counts as an incident.
    pub security_score: f64,
    /// Fraction of 100; latest synergy below `collaboration_synergy * 100` raises COLLABORATION_LOW.
    pub collaboration_synergy: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            performance_drop: 0.2,
            security_score: 0.7,
            collaboration_synergy: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Entity kinds observed by the change capture engine.
    pub kinds: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            kinds: schemas::ENTITY_KINDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, LedgerError> {
        let config: LedgerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, LedgerError> {
        toml::to_string_pretty(self).map_err(|e| LedgerError::ConfigError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.retention.days < 0 || self.retention.audit_extra_days < 0 {
            return Err(LedgerError::ConfigError(
                "retention days must not be negative".to_string(),
            ));
        }
        if self.retention.batch_size == 0 {
            return Err(LedgerError::ConfigError(
                "retention batch_size must be positive".to_string(),
            ));
        }
        let w = &self.health;
        for (name, value) in [
            ("performance", w.performance),
            ("security", w.security),
            ("collaboration", w.collaboration),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(LedgerError::ConfigError(format!(
                    "health weight '{}' must be a finite non-negative number",
                    name
                )));
            }
        }
        let a = &self.alerts;
        for (name, value) in [
            ("performance_drop", a.performance_drop),
            ("security_score", a.security_score),
            ("collaboration_synergy", a.collaboration_synergy),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(LedgerError::ConfigError(format!(
                    "alert threshold '{}' must be a finite non-negative number",
                    name
                )));
            }
        }
        for kind in &self.capture.kinds {
            if !schemas::is_entity_kind(kind) {
                return Err(LedgerError::ConfigError(format!(
                    "unknown entity kind in [capture].kinds: {}",
                    kind
                )));
            }
        }
        Ok(())
    }
}

/// Load `config.toml` from `dir`. No config = defaults (not an error).
pub fn load_config(dir: &Path) -> Result<LedgerConfig, LedgerError> {
    let config_path = dir.join(schemas::CONFIG_FILE_NAME);
    if !config_path.exists() {
        return Ok(LedgerConfig::default());
    }
    let content = fs::read_to_string(&config_path)?;
    LedgerConfig::from_toml_str(&content)
}

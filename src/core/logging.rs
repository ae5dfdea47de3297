//! Structured logging for the CLI.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! binaries. Logs go to stderr so stdout stays machine-readable.

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the filter directive (e.g. `evoledger=debug`).
pub const LOG_ENV_VAR: &str = "EVOLEDGER_LOG";

const DEFAULT_DIRECTIVE: &str = "warn";

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install the global subscriber once. Later calls are no-ops.
pub fn init_logging(json: bool) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

        let result = if json {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr).json())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .compact(),
                )
                .try_init()
        };

        // A subscriber installed by an embedding host wins.
        if result.is_err() {
            tracing::debug!("global tracing subscriber already set");
        }
    });
}

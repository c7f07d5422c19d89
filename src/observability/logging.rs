//! Structured logging setup and request-tracking spans.

use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;
use crate::errors::Result;

/// Create a tracing span for request tracking.
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4()
        )
    };
}

/// Create a tracing span for database operations.
#[macro_export]
macro_rules! db_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "db_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
}

/// Installs the global `tracing` subscriber. Honors `RUST_LOG` when set,
/// otherwise falls back to the configured `log_level`; emits newline-
/// delimited JSON when `json_logging` is set.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if config.json_logging {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    }
    .map_err(|e| crate::errors::MarchProxyError::config(format!("failed to install tracing subscriber: {e}")))
}

/// Logs the effective configuration at startup, redacting secrets.
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        server_address = %config.server.bind_address(),
        database_type = if config.database.is_sqlite() { "sqlite" } else { "postgresql" },
        metrics_enabled = config.observability.enable_metrics,
        license_tier = if config.license.license_key.is_empty() { "community" } else { "licensed" },
        "marchproxy control plane configuration"
    );
}

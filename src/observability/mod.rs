//! Structured logging, Prometheus metrics, and health checking for the
//! control plane process.

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::HealthChecker;
pub use logging::init_logging;
pub use metrics::{init_metrics, MetricsRecorder};

use crate::config::ObservabilityConfig;
use crate::errors::Result;
use tracing::info;

/// Initializes metrics collection and returns a fresh [`HealthChecker`] for
/// callers to register component health providers against.
pub async fn init_observability(config: &ObservabilityConfig) -> Result<HealthChecker> {
    if config.enable_metrics {
        init_metrics(config).await?;
    }

    let health_checker = HealthChecker::new();

    info!(
        log_level = %config.log_level,
        json_logging = config.json_logging,
        metrics_enabled = config.enable_metrics,
        "observability initialized"
    );

    Ok(health_checker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_observability_with_metrics_disabled_succeeds() {
        let config = ObservabilityConfig { enable_metrics: false, ..Default::default() };
        let result = init_observability(&config).await;
        assert!(result.is_ok());
    }
}

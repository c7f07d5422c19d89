//! Prometheus metrics for the control plane: HTTP traffic, fleet
//! registration state, config distribution, and license enforcement.

use std::net::SocketAddr;
use std::sync::Arc;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::ObservabilityConfig;
use crate::errors::{MarchProxyError, Result};

#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration: f64) {
        counter!("http_requests_total").increment(1);
        histogram!("http_request_duration_seconds").record(duration);
        let labels = [("method", method.to_string()), ("path", path.to_string())];
        counter!("http_requests_total", &labels).increment(1);
        let status_label = [("status", status.to_string())];
        counter!("http_responses_total", &status_label).increment(1);
    }

    pub fn record_db_query(&self, operation: &str, table: &str, duration: f64, success: bool) {
        let labels = [("operation", operation.to_string()), ("table", table.to_string())];
        counter!("db_queries_total", &labels).increment(1);
        let status = if success { "success" } else { "error" };
        let status_labels = [("operation", operation.to_string()), ("status", status.to_string())];
        counter!("db_queries_total", &status_labels).increment(1);
        histogram!("db_query_duration_seconds", &[("operation", operation.to_string())]).record(duration);
    }

    pub fn update_db_connections(&self, active: u32) {
        gauge!("db_connections_active").set(active as f64);
    }

    /// A proxy registered, re-registered, or was reaped for a given cluster.
    pub fn record_proxy_registration(&self, cluster_id: &str, outcome: &str) {
        let labels = [("cluster_id", cluster_id.to_string()), ("outcome", outcome.to_string())];
        counter!("fleet_proxy_registrations_total", &labels).increment(1);
    }

    pub fn update_active_proxies(&self, cluster_id: &str, count: i64) {
        let labels = [("cluster_id", cluster_id.to_string())];
        gauge!("fleet_active_proxies", &labels).set(count as f64);
    }

    pub fn record_reaper_sweep(&self, retired: u64) {
        counter!("fleet_reaper_retired_total").increment(retired);
    }

    pub fn record_config_render(&self, cluster_id: &str, duration: f64) {
        let labels = [("cluster_id", cluster_id.to_string())];
        histogram!("distributor_render_duration_seconds", &labels).record(duration);
        counter!("distributor_renders_total", &labels).increment(1);
    }

    pub fn record_config_poll(&self, outcome: &str) {
        let labels = [("outcome", outcome.to_string())];
        counter!("distributor_polls_total", &labels).increment(1);
    }

    pub fn record_license_keepalive(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        counter!("license_keepalive_total", &[("status", status.to_string())]).increment(1);
    }

    pub fn update_license_capacity(&self, max_proxies: i64) {
        gauge!("license_max_proxies").set(max_proxies as f64);
    }

    pub fn record_authentication(&self, surface: &str, status: &str) {
        let labels = [("surface", surface.to_string()), ("status", status.to_string())];
        counter!("auth_authentications_total", &labels).increment(1);
    }

    /// Registers baseline metric descriptions and zeroes counters so they
    /// appear in Prometheus output before the first event occurs.
    pub fn register_baseline(&self) {
        describe_counter!("http_requests_total", Unit::Count, "HTTP requests received");
        describe_histogram!("http_request_duration_seconds", Unit::Seconds, "HTTP request latency");
        describe_counter!("fleet_proxy_registrations_total", Unit::Count, "Proxy registration outcomes");
        describe_gauge!("fleet_active_proxies", Unit::Count, "Proxies counting against cluster capacity");
        describe_counter!("fleet_reaper_retired_total", Unit::Count, "Proxies retired by the liveness reaper");
        describe_histogram!("distributor_render_duration_seconds", Unit::Seconds, "Config snapshot render latency");
        describe_counter!("distributor_renders_total", Unit::Count, "Config snapshots rendered");
        describe_counter!("distributor_polls_total", Unit::Count, "Long-poll outcomes served to proxies");
        describe_counter!("license_keepalive_total", Unit::Count, "License issuer keepalive outcomes");
        describe_gauge!("license_max_proxies", Unit::Count, "Currently effective license capacity");
        describe_counter!("auth_authentications_total", Unit::Count, "Authentication attempts grouped by outcome");

        counter!("fleet_reaper_retired_total").absolute(0);
    }
}

static METRICS: once_cell::sync::Lazy<Arc<RwLock<Option<MetricsRecorder>>>> =
    once_cell::sync::Lazy::new(|| Arc::new(RwLock::new(None)));

/// Starts the Prometheus HTTP exporter and stores the global recorder.
/// A no-op when metrics are disabled or no bind port is configured.
pub async fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let Some(metrics_addr) = config.metrics_bind_address() else {
        warn!("metrics enabled but metrics_port is 0, skipping exporter startup");
        return Ok(());
    };

    let socket_addr: SocketAddr = metrics_addr
        .parse()
        .map_err(|e| MarchProxyError::config(format!("invalid metrics bind address '{metrics_addr}': {e}")))?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .install()
        .map_err(|e| MarchProxyError::config(format!("failed to start metrics exporter: {e}")))?;

    let recorder = MetricsRecorder::new();
    recorder.register_baseline();
    *METRICS.write().await = Some(recorder);

    info!(metrics_addr = %metrics_addr, "metrics exporter started");
    Ok(())
}

pub async fn get_metrics() -> Option<MetricsRecorder> {
    METRICS.read().await.clone()
}

pub async fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_http_request(method, path, status, duration);
    }
}

pub async fn record_authentication(surface: &str, status: &str) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_authentication(surface, status);
    }
}

pub async fn record_proxy_registration(cluster_id: &str, outcome: &str) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_proxy_registration(cluster_id, outcome);
    }
}

pub async fn record_config_poll(outcome: &str) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_config_poll(outcome);
    }
}

//! Configuration structure for the control plane process.

use crate::errors::{MarchProxyError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Top-level application configuration, assembled by [`super::load_config`].
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,

    #[validate(nested)]
    pub database: DatabaseConfig,

    #[validate(nested)]
    pub observability: ObservabilityConfig,

    #[validate(nested)]
    pub auth: AuthConfig,

    #[validate(nested)]
    pub license: LicenseConfig,

    #[validate(nested)]
    pub fleet: FleetConfig,

    #[validate(nested)]
    pub secrets: SecretsConfig,

    /// Advertised external base URL (spec's `BASE_URL`), used to build
    /// links returned from operator-facing endpoints.
    pub base_url: String,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(MarchProxyError::from)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        if !self.database.url.starts_with("postgresql://") && !self.database.url.starts_with("sqlite://") {
            return Err(MarchProxyError::validation("database URL must start with 'postgresql://' or 'sqlite://'"));
        }

        if self.auth.jwt_secret.len() < 32 {
            return Err(MarchProxyError::validation("JWT secret must be at least 32 characters long"));
        }

        if self.fleet.retire_seconds <= self.fleet.stale_seconds {
            return Err(MarchProxyError::validation("PROXY_RETIRE_SECONDS must be greater than PROXY_STALE_SECONDS"));
        }

        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    #[validate(range(min = 1, max = 300, message = "Timeout must be between 1 and 300 seconds"))]
    pub timeout_seconds: u64,

    #[validate(range(min = 1024, message = "Max body size must be at least 1KB"))]
    pub max_body_size: usize,

    pub enable_cors: bool,

    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            timeout_seconds: 30,
            max_body_size: 1024 * 1024,
            enable_cors: true,
            cors_origins: vec![],
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Database configuration (spec's `STORE_URL`).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    #[validate(range(min = 0, max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    #[validate(range(min = 1, max = 60, message = "Connect timeout must be between 1 and 60 seconds"))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout).
    pub idle_timeout_seconds: u64,

    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/marchproxy.db".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    pub fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite://")
    }

    pub fn is_postgresql(&self) -> bool {
        self.url.starts_with("postgresql://")
    }
}

/// Observability configuration: structured logging and the scrape-format
/// counters endpoint. Exporters (Jaeger, OTel) are out of scope — the core
/// exposes counters and events, transport stays pluggable per spec.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    pub enable_metrics: bool,

    /// Metrics server port (0 = disabled).
    #[validate(range(max = 65535, message = "Metrics port must be <= 65535"))]
    pub metrics_port: u16,

    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    pub json_logging: bool,

    #[validate(range(min = 1, max = 300, message = "Health check interval must be between 1 and 300 seconds"))]
    pub health_check_interval_seconds: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            metrics_port: 9090,
            log_level: "info".to_string(),
            json_logging: false,
            health_check_interval_seconds: 30,
        }
    }
}

impl ObservabilityConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds)
    }

    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}

/// Operator session authentication (JWT issued on successful login).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AuthConfig {
    #[validate(length(min = 1, message = "JWT secret cannot be empty"))]
    pub jwt_secret: String,

    #[validate(range(min = 300, max = 86400, message = "Token expiry must be between 5 minutes and 24 hours"))]
    pub token_expiry_seconds: u64,

    #[validate(length(min = 1, message = "JWT issuer cannot be empty"))]
    pub jwt_issuer: String,

    #[validate(length(min = 1, message = "JWT audience cannot be empty"))]
    pub jwt_audience: String,

    /// `ADMIN_BOOTSTRAP_PASSWORD`: creates the first operator account when
    /// the `operator_accounts` table is empty. Consumed once at boot.
    pub admin_bootstrap_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "marchproxy-default-secret-please-change-in-production".to_string(),
            token_expiry_seconds: 3600,
            jwt_issuer: "marchproxy".to_string(),
            jwt_audience: "marchproxy-api".to_string(),
            admin_bootstrap_password: None,
        }
    }
}

impl AuthConfig {
    pub fn token_expiry(&self) -> Duration {
        Duration::from_secs(self.token_expiry_seconds)
    }
}

/// License Enforcer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LicenseConfig {
    /// Empty means community tier.
    pub license_key: String,

    pub issuer_url: Option<String>,

    #[validate(range(min = 1, message = "Keepalive interval must be at least 1 second"))]
    pub keepalive_interval_seconds: u64,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self { license_key: String::new(), issuer_url: None, keepalive_interval_seconds: 3600 }
    }
}

impl LicenseConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_seconds)
    }
}

/// Fleet Registrar liveness thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FleetConfig {
    #[validate(range(min = 1, message = "Stale threshold must be positive"))]
    pub stale_seconds: i64,

    #[validate(range(min = 1, message = "Retire threshold must be positive"))]
    pub retire_seconds: i64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self { stale_seconds: 600, retire_seconds: 1800 }
    }
}

/// Secret-at-rest encryption for service auth material.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct SecretsConfig {
    /// Base64-encoded 256-bit AES-GCM key (`MARCHPROXY_SECRET_ENCRYPTION_KEY`).
    /// Absent only in development; the control plane refuses to start
    /// against a non-empty store without one.
    pub encryption_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = AppConfig { base_url: "http://localhost:8080".to_string(), ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn server_config_bind_address() {
        let config = ServerConfig { host: "0.0.0.0".to_string(), port: 8080, ..Default::default() };
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn database_config_timeouts() {
        let config = DatabaseConfig { connect_timeout_seconds: 15, idle_timeout_seconds: 300, ..Default::default() };
        assert_eq!(config.connect_timeout(), Duration::from_secs(15));
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(300)));

        let config_no_idle = DatabaseConfig { idle_timeout_seconds: 0, ..Default::default() };
        assert_eq!(config_no_idle.idle_timeout(), None);
    }

    #[test]
    fn database_config_type_detection() {
        let sqlite = DatabaseConfig { url: "sqlite://./test.db".to_string(), ..Default::default() };
        assert!(sqlite.is_sqlite());
        assert!(!sqlite.is_postgresql());

        let pg = DatabaseConfig { url: "postgresql://localhost/test".to_string(), ..Default::default() };
        assert!(!pg.is_sqlite());
        assert!(pg.is_postgresql());
    }

    #[test]
    fn observability_metrics_address_toggles_off_at_port_zero() {
        let config = ObservabilityConfig { metrics_port: 9090, ..Default::default() };
        assert_eq!(config.metrics_bind_address(), Some("0.0.0.0:9090".to_string()));

        let disabled = ObservabilityConfig { metrics_port: 0, ..Default::default() };
        assert_eq!(disabled.metrics_bind_address(), None);
    }

    #[test]
    fn rejects_short_jwt_secret() {
        let config = AppConfig { auth: AuthConfig { jwt_secret: "short".to_string(), ..Default::default() }, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_invalid_database_url() {
        let config =
            AppConfig { database: DatabaseConfig { url: "invalid://url".to_string(), ..Default::default() }, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_retire_threshold_not_exceeding_stale_threshold() {
        let config = AppConfig { fleet: FleetConfig { stale_seconds: 600, retire_seconds: 600 }, ..Default::default() };
        assert!(config.validate().is_err());
    }
}

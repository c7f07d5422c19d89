//! Integration tests for the server startup sequence.
//!
//! Builds a real in-memory SQLite pool and config, the same way a unit test
//! under `src/` would via [`marchproxy::storage::test_helpers::TestDatabase`],
//! but exercises `run_server` end to end: migrations, first-time bootstrap,
//! encryption key resolution, and clean shutdown on signal.

use std::time::Duration;

use marchproxy::config::{
    AppConfig, AuthConfig, DatabaseConfig, FleetConfig, LicenseConfig, ObservabilityConfig, SecretsConfig, ServerConfig,
};

// A single pooled connection to a private in-memory database, same as
// `storage::test_helpers::TestDatabase` uses -- more than one connection to
// `sqlite://:memory:` would each see an independent, unmigrated database.
fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig { port: 0, ..Default::default() },
        database: DatabaseConfig {
            url: "sqlite://:memory:".to_string(),
            auto_migrate: true,
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        },
        auth: AuthConfig {
            jwt_secret: "a-secret-at-least-32-bytes-long!".to_string(),
            token_expiry_seconds: 3600,
            jwt_issuer: "marchproxy".to_string(),
            ..Default::default()
        },
        fleet: FleetConfig { stale_seconds: 60, retire_seconds: 120 },
        license: LicenseConfig { license_key: "test-key".to_string(), issuer_url: None, keepalive_interval_seconds: 60 },
        observability: ObservabilityConfig { enable_metrics: false, ..Default::default() },
        secrets: SecretsConfig { encryption_key: None },
        ..Default::default()
    }
}

#[tokio::test]
async fn run_server_bootstraps_and_shuts_down_cleanly_on_an_empty_store() {
    let config = test_config();

    let shutdown = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    let result = tokio::time::timeout(Duration::from_secs(5), marchproxy::startup::run_server(config, shutdown)).await;
    assert!(result.is_ok(), "run_server should return before the timeout once shutdown resolves");
    assert!(result.unwrap().is_ok(), "an empty store with no configured encryption key should bootstrap with an ephemeral one");
}

//! Configuration management for the control plane process.
//!
//! Configuration layers, later sources overriding earlier ones:
//! 1. Defaults (`AppConfig::default()`)
//! 2. An optional YAML file
//! 3. `MARCHPROXY_`-prefixed environment variables (generic overrides,
//!    `MARCHPROXY_SERVER_PORT` etc.)
//! 4. The small set of bare-named environment variables spec.md calls out
//!    by name (`STORE_URL`, `BASE_URL`, `LICENSE_KEY`, ...), applied last so
//!    operators can set them without learning the prefixed form.

pub mod settings;
pub mod tls;

pub use settings::{AppConfig, AuthConfig, DatabaseConfig, FleetConfig, LicenseConfig, ObservabilityConfig, SecretsConfig, ServerConfig};

use crate::errors::{MarchProxyError, Result};
use config::{Config, Environment, File};
use std::path::Path;

/// Load application configuration from multiple sources.
pub fn load_config<P: AsRef<Path>>(config_path: Option<P>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    builder = builder.add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        let path = path.as_ref();
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            return Err(MarchProxyError::config(format!("configuration file not found: {}", path.display())));
        }
    }

    builder = builder.add_source(Environment::with_prefix("MARCHPROXY").separator("_").try_parsing(true));

    let config = builder.build().map_err(MarchProxyError::from)?;

    let mut app_config: AppConfig = config.try_deserialize().map_err(MarchProxyError::from)?;

    apply_named_env_overrides(&mut app_config);
    app_config.validate()?;

    Ok(app_config)
}

/// Applies the bare-named environment variables spec.md's external
/// interfaces table recognizes, on top of whatever the layered config
/// build already produced.
fn apply_named_env_overrides(config: &mut AppConfig) {
    if let Ok(url) = std::env::var("STORE_URL") {
        config.database.url = url;
    }
    if let Ok(base_url) = std::env::var("BASE_URL") {
        config.base_url = base_url;
    }
    if let Ok(key) = std::env::var("LICENSE_KEY") {
        config.license.license_key = key;
    }
    if let Ok(url) = std::env::var("LICENSE_ISSUER_URL") {
        config.license.issuer_url = Some(url);
    }
    if let Ok(password) = std::env::var("ADMIN_BOOTSTRAP_PASSWORD") {
        config.auth.admin_bootstrap_password = Some(password);
    }
    if let Some(stale) = parse_env("PROXY_STALE_SECONDS") {
        config.fleet.stale_seconds = stale;
    }
    if let Some(retire) = parse_env("PROXY_RETIRE_SECONDS") {
        config.fleet.retire_seconds = retire;
    }
    if let Some(keepalive) = parse_env("KEEPALIVE_INTERVAL_SECONDS") {
        config.license.keepalive_interval_seconds = keepalive;
    }
    if let Ok(key) = std::env::var("MARCHPROXY_SECRET_ENCRYPTION_KEY") {
        config.secrets.encryption_key = Some(key);
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Load configuration from environment variables only. Useful for
/// containerized deployments.
pub fn load_config_from_env() -> Result<AppConfig> {
    load_config::<&str>(None)
}

/// Load configuration from a YAML file.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    load_config(Some(path))
}

//! First-run bootstrap and background task lifecycle for the control plane
//! process: creating the default cluster and operator account on an empty
//! store, then spawning (and later gracefully stopping) the Fleet
//! Registrar's reaper, the License Enforcer's keepalive loop, and the
//! Config Distributor's refresh sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::auth::hashing::{hash_cluster_api_key, hash_password};
use crate::auth::jwt::AuthService;
use crate::config::settings::{AuthConfig, FleetConfig, LicenseConfig};
use crate::config::AppConfig;
use crate::distributor::{self, ConfigDistributor};
use crate::domain::Cluster;
use crate::errors::{MarchProxyError, Result};
use crate::license::{keepalive, LicenseEnforcer};
use crate::observability::health::{DatabaseHealthProvider, HealthChecker, LicenseHealthProvider};
use crate::registrar::{self, FleetRegistrar};
use crate::services::SecretEncryption;
use crate::storage::repositories::{
    AuditEvent, AuditLogRepository, ClusterRepository, LicenseRepository, OperatorRepository, ServiceRepository,
};
use crate::storage::DbPool;

/// Resolves the secret-at-rest encryption key for this process.
///
/// A configured `MARCHPROXY_SECRET_ENCRYPTION_KEY` is always used. Its
/// absence is only tolerated against a store with no services yet -- there
/// is nothing encrypted under a lost key to fail to decrypt later. Against a
/// store that already holds services, this is the enforcement point for the
/// invariant documented on [`crate::config::settings::SecretsConfig`].
async fn resolve_secret_encryption(config: &AppConfig, pool: &DbPool) -> Result<SecretEncryption> {
    if let Some(key) = &config.secrets.encryption_key {
        return SecretEncryption::new(key);
    }

    let services = ServiceRepository::new(pool.clone(), SecretEncryption::ephemeral()?);
    if services.count().await? > 0 {
        return Err(MarchProxyError::config(
            "MARCHPROXY_SECRET_ENCRYPTION_KEY is required once the store holds services",
        ));
    }

    warn!("MARCHPROXY_SECRET_ENCRYPTION_KEY is unset; generating an ephemeral key for this empty store");
    SecretEncryption::ephemeral()
}

/// Builds every long-lived service the HTTP API and background tasks share,
/// then runs the control plane until `shutdown` resolves.
pub async fn run_server(config: AppConfig, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> Result<()> {
    let pool = crate::storage::create_pool(&config.database).await?;

    if config.database.auto_migrate {
        crate::storage::run_migrations(&pool).await?;
    }

    if let Some(api_key) = handle_first_time_startup(pool.clone(), &config.auth).await? {
        info!(api_key = %api_key, "generated API key for the default cluster -- record this, it is shown only once");
    }

    let encryption = resolve_secret_encryption(&config, &pool).await?;
    let services = ServiceRepository::new(pool.clone(), encryption);

    let registrar = Arc::new(FleetRegistrar::new(pool.clone(), config.fleet.stale_seconds, config.fleet.retire_seconds));
    let distributor = Arc::new(ConfigDistributor::new(pool.clone(), services));
    let license = Arc::new(LicenseEnforcer::new(LicenseRepository::new(pool.clone()), &config.license).await?);
    let auth = Arc::new(AuthService::new(&config.auth));

    let health = Arc::new(HealthChecker::new());
    health.register_provider("database", Box::new(DatabaseHealthProvider::new(pool.clone()))).await;
    health.register_provider("license", Box::new(LicenseHealthProvider::new(license.clone()))).await;

    let state = crate::api::state::AppState {
        pool: pool.clone(),
        registrar: registrar.clone(),
        distributor: distributor.clone(),
        license: license.clone(),
        auth,
        health,
        clusters: ClusterRepository::new(pool.clone()),
        operators: OperatorRepository::new(pool.clone()),
        audit: AuditLogRepository::new(pool.clone()),
    };

    let background = BackgroundTasks::spawn(registrar, license, distributor, &config.fleet, &config.license);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown.await;
        let _ = shutdown_tx.send(true);
    });
    let api_shutdown = {
        let mut rx = shutdown_rx;
        async move {
            let _ = rx.changed().await;
        }
    };

    let server_result = crate::api::server::start_api_server(&config.server, state, api_shutdown).await;

    background.shutdown(Duration::from_secs(10)).await;

    server_result
}

/// Generates the default cluster's API key and the first operator account's
/// password if the store is empty. Returns the generated cluster API key so
/// the caller can display it exactly once; absent on a store that was
/// already bootstrapped.
pub async fn handle_first_time_startup(pool: DbPool, auth: &AuthConfig) -> Result<Option<String>> {
    let clusters = ClusterRepository::new(pool.clone());
    let operators = OperatorRepository::new(pool.clone());
    let audit = AuditLogRepository::new(pool.clone());

    let mut generated_api_key = None;

    if clusters.count().await? == 0 {
        info!("no clusters found, bootstrapping the default cluster");
        let api_key = generate_api_key();
        let api_key_hash = hash_cluster_api_key(&api_key);
        let mut cluster = Cluster::new("default", api_key_hash, 3);
        cluster.is_default = true;
        clusters.create(&cluster).await?;
        audit
            .record(AuditEvent::new("cluster.bootstrapped", "startup", "cluster", cluster.id.as_str()))
            .await?;
        generated_api_key = Some(api_key);
    }

    if operators.count().await? == 0 {
        match &auth.admin_bootstrap_password {
            Some(password) if !password.is_empty() => {
                let password_hash = hash_password(password)?;
                let operator = operators.create("admin", &password_hash).await?;
                audit
                    .record(AuditEvent::new("operator.bootstrapped", "startup", "operator_account", &operator.id))
                    .await?;
                info!(username = "admin", "bootstrapped the first operator account");
            }
            _ => {
                warn!(
                    "no operator accounts exist and ADMIN_BOOTSTRAP_PASSWORD is unset; \
                     operator-session endpoints will be unreachable until one is created"
                );
            }
        }
    }

    Ok(generated_api_key)
}

fn generate_api_key() -> String {
    use base64::Engine;
    use rand::Rng;
    let bytes: [u8; 32] = rand::thread_rng().gen();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Handles to every background task spawned for the lifetime of the
/// process, plus the shared shutdown signal that stops all of them.
pub struct BackgroundTasks {
    shutdown_tx: watch::Sender<bool>,
    reaper: JoinHandle<()>,
    keepalive: JoinHandle<()>,
    distributor_refresh: JoinHandle<()>,
}

impl BackgroundTasks {
    pub fn spawn(
        registrar: Arc<FleetRegistrar>,
        license_enforcer: Arc<LicenseEnforcer>,
        distributor: Arc<ConfigDistributor>,
        fleet: &FleetConfig,
        license: &LicenseConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reaper = registrar::reaper::spawn(registrar, fleet.stale_seconds, fleet.retire_seconds, shutdown_rx.clone());
        let keepalive = keepalive::spawn(license_enforcer, license.clone(), shutdown_rx.clone());
        let distributor_refresh = distributor::refresh::spawn(distributor, Duration::from_secs(5), shutdown_rx);

        Self { shutdown_tx, reaper, keepalive, distributor_refresh }
    }

    /// Signals every background task to stop and waits up to `deadline` for
    /// them to exit cleanly; a task still running past the deadline is
    /// aborted rather than left to block process exit.
    pub async fn shutdown(self, deadline: Duration) {
        let _ = self.shutdown_tx.send(true);

        let joined = tokio::time::timeout(deadline, async {
            let _ = tokio::join!(self.reaper, self.keepalive, self.distributor_refresh);
        })
        .await;

        if joined.is_err() {
            warn!("background tasks did not stop within the shutdown deadline");
        }
    }
}

//! Shared `AppState` wiring for handler unit tests.

use std::sync::Arc;

use crate::api::state::AppState;
use crate::auth::jwt::AuthService;
use crate::config::settings::{AuthConfig, LicenseConfig};
use crate::distributor::ConfigDistributor;
use crate::license::LicenseEnforcer;
use crate::observability::health::HealthChecker;
use crate::registrar::FleetRegistrar;
use crate::services::secret_encryption::SecretEncryption;
use crate::storage::repositories::{
    AuditLogRepository, ClusterRepository, LicenseRepository, OperatorRepository, ServiceRepository,
};
use crate::storage::DbPool;

pub(crate) async fn test_state_with_pool(pool: DbPool) -> AppState {
    let auth_config = AuthConfig { admin_bootstrap_password: None, ..Default::default() };
    AppState {
        pool: pool.clone(),
        registrar: Arc::new(FleetRegistrar::new(pool.clone(), 30, 300)),
        distributor: Arc::new(ConfigDistributor::new(
            pool.clone(),
            ServiceRepository::new(pool.clone(), SecretEncryption::for_testing()),
        )),
        license: Arc::new(
            LicenseEnforcer::new(LicenseRepository::new(pool.clone()), &LicenseConfig::default()).await.unwrap(),
        ),
        auth: Arc::new(AuthService::new(&auth_config)),
        health: Arc::new(HealthChecker::new()),
        clusters: ClusterRepository::new(pool.clone()),
        operators: OperatorRepository::new(pool.clone()),
        audit: AuditLogRepository::new(pool),
    }
}

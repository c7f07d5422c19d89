//! Shared application state handed to every HTTP handler via axum's
//! `State` extractor.

use std::sync::Arc;

use crate::auth::jwt::AuthService;
use crate::distributor::ConfigDistributor;
use crate::license::LicenseEnforcer;
use crate::observability::health::HealthChecker;
use crate::registrar::FleetRegistrar;
use crate::storage::repositories::{AuditLogRepository, ClusterRepository, OperatorRepository};
use crate::storage::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub registrar: Arc<FleetRegistrar>,
    pub distributor: Arc<ConfigDistributor>,
    pub license: Arc<LicenseEnforcer>,
    pub auth: Arc<AuthService>,
    pub health: Arc<HealthChecker>,
    pub clusters: ClusterRepository,
    pub operators: OperatorRepository,
    pub audit: AuditLogRepository,
}

//! Database connectivity and the persistence layer for control-plane
//! state: clusters, proxies, services, mappings, certificates, licenses,
//! audit events, and operator accounts.

pub mod migrations;
pub mod pool;
pub mod repositories;

#[cfg(test)]
pub mod test_helpers;

pub use crate::config::DatabaseConfig;

pub use migrations::{
    get_migration_version, list_applied_migrations, run_migrations as run_db_migrations,
    validate_migrations, MigrationInfo,
};
pub use pool::{create_pool, get_pool_stats, DbPool, PoolStats};
pub use repositories::{
    AuditEvent, AuditLogRepository, AuditRecord, CertificateRepository, ClusterRepository,
    LicenseRepository, MappingRepository, OperatorAccount, OperatorRepository, ProxyRepository,
    ServiceRepository,
};

use crate::errors::{MarchProxyError, Result};

/// Run database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    migrations::run_migrations(pool).await
}

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| MarchProxyError::Database {
        source: e,
        context: "Database connectivity check failed".to_string(),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::test_helpers::TestDatabase;
    use super::*;

    #[tokio::test]
    async fn pool_connects_and_passes_health_check() {
        let test_db = TestDatabase::new("create_pool").await;
        check_connection(&test_db.pool).await.unwrap();
    }

    #[tokio::test]
    async fn create_pool_rejects_unknown_scheme() {
        let config = DatabaseConfig { url: "invalid://url".to_string(), ..Default::default() };
        assert!(create_pool(&config).await.is_err());
    }

    #[tokio::test]
    async fn migrations_run_against_fresh_database() {
        let test_db = TestDatabase::new("run_migrations").await;
        assert!(run_migrations(&test_db.pool).await.is_ok());
    }
}

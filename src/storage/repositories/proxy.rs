//! Proxy repository.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

use crate::domain::{ClusterId, Proxy, ProxyId, ProxyStatus};
use crate::errors::{MarchProxyError, Result};
use crate::storage::DbPool;

#[derive(Debug, FromRow)]
struct ProxyRow {
    id: String,
    cluster_id: String,
    name: String,
    hostname: String,
    address: String,
    port: i64,
    version: String,
    capabilities_json: String,
    status: String,
    last_heartbeat: DateTime<Utc>,
    config_version: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProxyRow {
    fn into_domain(self) -> Result<Proxy> {
        let capabilities: Vec<String> = serde_json::from_str(&self.capabilities_json)?;
        let status = ProxyStatus::parse(&self.status)
            .ok_or_else(|| MarchProxyError::internal(format!("unknown proxy status in store: {}", self.status)))?;
        Ok(Proxy {
            id: ProxyId::from_string(self.id),
            cluster_id: ClusterId::from_string(self.cluster_id),
            name: self.name,
            hostname: self.hostname,
            address: self.address,
            port: self.port as i32,
            version: self.version,
            capabilities,
            status,
            last_heartbeat: self.last_heartbeat,
            config_version: self.config_version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct ProxyRepository {
    pool: DbPool,
}

impl ProxyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Looks up the (cluster, name) slot this registration would occupy, if
    /// one already exists (stale/retired records are reused, not
    /// duplicated).
    #[instrument(skip(self), fields(cluster_id = %cluster_id, proxy_name = name))]
    pub async fn find_by_cluster_and_name(&self, cluster_id: &ClusterId, name: &str) -> Result<Option<Proxy>> {
        let row = sqlx::query_as::<_, ProxyRow>("SELECT * FROM proxies WHERE cluster_id = $1 AND name = $2")
            .bind(cluster_id.as_str())
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ProxyRow::into_domain).transpose()
    }

    #[instrument(skip(self, tx, proxy), fields(proxy_id = %proxy.id))]
    pub async fn insert_in_tx(&self, tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, proxy: &Proxy) -> Result<()> {
        let capabilities_json = serde_json::to_string(&proxy.capabilities)?;
        sqlx::query(
            "INSERT INTO proxies (id, cluster_id, name, hostname, address, port, version, capabilities_json, status, last_heartbeat, config_version, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
        )
        .bind(proxy.id.as_str())
        .bind(proxy.cluster_id.as_str())
        .bind(&proxy.name)
        .bind(&proxy.hostname)
        .bind(&proxy.address)
        .bind(proxy.port)
        .bind(&proxy.version)
        .bind(capabilities_json)
        .bind(proxy.status.as_str())
        .bind(proxy.last_heartbeat)
        .bind(&proxy.config_version)
        .bind(proxy.created_at)
        .bind(proxy.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, tx, proxy), fields(proxy_id = %proxy.id))]
    pub async fn update_in_tx(&self, tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, proxy: &Proxy) -> Result<()> {
        let capabilities_json = serde_json::to_string(&proxy.capabilities)?;
        sqlx::query(
            "UPDATE proxies SET hostname=$1, address=$2, port=$3, version=$4, capabilities_json=$5, status=$6,
             last_heartbeat=$7, config_version=$8, updated_at=$9 WHERE id=$10",
        )
        .bind(&proxy.hostname)
        .bind(&proxy.address)
        .bind(proxy.port)
        .bind(&proxy.version)
        .bind(capabilities_json)
        .bind(proxy.status.as_str())
        .bind(proxy.last_heartbeat)
        .bind(&proxy.config_version)
        .bind(proxy.updated_at)
        .bind(proxy.id.as_str())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(cluster_id = %cluster_id))]
    pub async fn count_active(&self, cluster_id: &ClusterId) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM proxies WHERE cluster_id = $1 AND status != 'retired'")
            .bind(cluster_id.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Same count as [`Self::count_active`] but read inside an existing
    /// transaction, so the Fleet Registrar's capacity check and insert
    /// observe one logical snapshot.
    #[instrument(skip(self, tx), fields(cluster_id = %cluster_id))]
    pub async fn count_active_in_tx(&self, tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, cluster_id: &ClusterId) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM proxies WHERE cluster_id = $1 AND status != 'retired'")
            .bind(cluster_id.as_str())
            .fetch_one(&mut **tx)
            .await?;
        Ok(row.0)
    }

    #[instrument(skip(self), fields(cluster_id = %cluster_id))]
    pub async fn list_by_cluster(&self, cluster_id: &ClusterId) -> Result<Vec<Proxy>> {
        let rows = sqlx::query_as::<_, ProxyRow>("SELECT * FROM proxies WHERE cluster_id = $1 ORDER BY name")
            .bind(cluster_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ProxyRow::into_domain).collect()
    }

    #[instrument(skip(self))]
    pub async fn list_non_retired(&self) -> Result<Vec<Proxy>> {
        let rows = sqlx::query_as::<_, ProxyRow>("SELECT * FROM proxies WHERE status != 'retired'").fetch_all(&self.pool).await?;
        rows.into_iter().map(ProxyRow::into_domain).collect()
    }

    #[instrument(skip(self, proxy), fields(proxy_id = %proxy.id))]
    pub async fn update(&self, proxy: &Proxy) -> Result<()> {
        let capabilities_json = serde_json::to_string(&proxy.capabilities)?;
        sqlx::query(
            "UPDATE proxies SET hostname=$1, address=$2, port=$3, version=$4, capabilities_json=$5, status=$6,
             last_heartbeat=$7, config_version=$8, updated_at=$9 WHERE id=$10",
        )
        .bind(&proxy.hostname)
        .bind(&proxy.address)
        .bind(proxy.port)
        .bind(&proxy.version)
        .bind(capabilities_json)
        .bind(proxy.status.as_str())
        .bind(proxy.last_heartbeat)
        .bind(&proxy.config_version)
        .bind(proxy.updated_at)
        .bind(proxy.id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(proxy_id = %id))]
    pub async fn get_by_id(&self, id: &ProxyId) -> Result<Proxy> {
        let row = sqlx::query_as::<_, ProxyRow>("SELECT * FROM proxies WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| MarchProxyError::not_found("proxy", id.as_str()))?;
        row.into_domain()
    }
}

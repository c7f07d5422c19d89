//! Cluster repository.

use chrono::Utc;
use sqlx::FromRow;
use tracing::instrument;

use crate::domain::cluster::LoggingConfig;
use crate::domain::{Cluster, ClusterId};
use crate::errors::{MarchProxyError, Result};
use crate::storage::DbPool;

#[derive(Debug, FromRow)]
struct ClusterRow {
    id: String,
    name: String,
    api_key_hash: String,
    max_proxies: i64,
    logging_json: String,
    is_default: bool,
    active: bool,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl ClusterRow {
    fn into_domain(self) -> Result<Cluster> {
        let logging: LoggingConfig = serde_json::from_str(&self.logging_json)?;
        Ok(Cluster {
            id: ClusterId::from_string(self.id),
            name: self.name,
            api_key_hash: self.api_key_hash,
            max_proxies: self.max_proxies,
            logging,
            is_default: self.is_default,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct ClusterRepository {
    pool: DbPool,
}

impl ClusterRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, cluster), fields(cluster_id = %cluster.id))]
    pub async fn create(&self, cluster: &Cluster) -> Result<()> {
        let logging_json = serde_json::to_string(&cluster.logging)?;
        sqlx::query(
            "INSERT INTO clusters (id, name, api_key_hash, max_proxies, logging_json, is_default, active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(cluster.id.as_str())
        .bind(&cluster.name)
        .bind(&cluster.api_key_hash)
        .bind(cluster.max_proxies)
        .bind(logging_json)
        .bind(cluster.is_default)
        .bind(cluster.active)
        .bind(cluster.created_at)
        .bind(cluster.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(cluster_id = %id))]
    pub async fn get_by_id(&self, id: &ClusterId) -> Result<Cluster> {
        let row = sqlx::query_as::<_, ClusterRow>("SELECT * FROM clusters WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| MarchProxyError::not_found("cluster", id.as_str()))?;
        row.into_domain()
    }

    /// Looks up a cluster by its API key, checking the hash of every active
    /// cluster in constant time via the caller-supplied comparator. Small
    /// cluster counts make a linear scan acceptable; see
    /// `registrar::verify_cluster_key` for the constant-time comparison.
    #[instrument(skip(self))]
    pub async fn list_active(&self) -> Result<Vec<Cluster>> {
        let rows = sqlx::query_as::<_, ClusterRow>("SELECT * FROM clusters WHERE active = 1").fetch_all(&self.pool).await?;
        rows.into_iter().map(ClusterRow::into_domain).collect()
    }

    #[instrument(skip(self))]
    pub async fn get_default(&self) -> Result<Option<Cluster>> {
        let row = sqlx::query_as::<_, ClusterRow>("SELECT * FROM clusters WHERE is_default = 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(ClusterRow::into_domain).transpose()
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM clusters").fetch_one(&self.pool).await?;
        Ok(row.0)
    }

    #[instrument(skip(self, new_api_key_hash), fields(cluster_id = %id))]
    pub async fn rotate_api_key(&self, id: &ClusterId, new_api_key_hash: &str) -> Result<()> {
        let result = sqlx::query("UPDATE clusters SET api_key_hash = $1, updated_at = $2 WHERE id = $3")
            .bind(new_api_key_hash)
            .bind(Utc::now())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MarchProxyError::not_found("cluster", id.as_str()));
        }
        Ok(())
    }
}

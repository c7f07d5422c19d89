//! Mapping repository.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

use crate::domain::mapping::{PortSpec, Protocol};
use crate::domain::{ClusterId, Mapping, MappingId, ServiceId};
use crate::errors::{MarchProxyError, Result};
use crate::storage::DbPool;

#[derive(Debug, FromRow)]
struct MappingRow {
    id: String,
    cluster_id: String,
    name: String,
    source_services_json: String,
    destination_services_json: String,
    ports_json: String,
    protocols_json: String,
    auth_required: bool,
    priority: i64,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MappingRow {
    fn into_domain(self) -> Result<Mapping> {
        let source_ids: Vec<String> = serde_json::from_str(&self.source_services_json)?;
        let dest_ids: Vec<String> = serde_json::from_str(&self.destination_services_json)?;
        let ports: Vec<PortSpec> = serde_json::from_str(&self.ports_json)?;
        let protocols: Vec<Protocol> = serde_json::from_str(&self.protocols_json)?;
        Ok(Mapping {
            id: MappingId::from_string(self.id),
            cluster_id: ClusterId::from_string(self.cluster_id),
            name: self.name,
            source_services: source_ids.into_iter().map(ServiceId::from_string).collect(),
            destination_services: dest_ids.into_iter().map(ServiceId::from_string).collect(),
            ports,
            protocols,
            auth_required: self.auth_required,
            priority: self.priority as i32,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct MappingRepository {
    pool: DbPool,
}

impl MappingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, mapping), fields(mapping_id = %mapping.id))]
    pub async fn create(&self, mapping: &Mapping) -> Result<()> {
        let source_services_json = serde_json::to_string(&mapping.source_services.iter().map(|s| s.as_str()).collect::<Vec<_>>())?;
        let destination_services_json =
            serde_json::to_string(&mapping.destination_services.iter().map(|s| s.as_str()).collect::<Vec<_>>())?;
        let ports_json = serde_json::to_string(&mapping.ports)?;
        let protocols_json = serde_json::to_string(&mapping.protocols)?;

        sqlx::query(
            "INSERT INTO mappings (id, cluster_id, name, source_services_json, destination_services_json, ports_json, protocols_json, auth_required, priority, active, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
        )
        .bind(mapping.id.as_str())
        .bind(mapping.cluster_id.as_str())
        .bind(&mapping.name)
        .bind(source_services_json)
        .bind(destination_services_json)
        .bind(ports_json)
        .bind(protocols_json)
        .bind(mapping.auth_required)
        .bind(mapping.priority)
        .bind(mapping.active)
        .bind(mapping.created_at)
        .bind(mapping.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(mapping_id = %id))]
    pub async fn get_by_id(&self, id: &MappingId) -> Result<Mapping> {
        let row = sqlx::query_as::<_, MappingRow>("SELECT * FROM mappings WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| MarchProxyError::not_found("mapping", id.as_str()))?;
        row.into_domain()
    }

    /// Mappings for a cluster, pre-sorted in the same precedence order the
    /// Config Distributor renders them in.
    #[instrument(skip(self), fields(cluster_id = %cluster_id))]
    pub async fn list_active_by_cluster(&self, cluster_id: &ClusterId) -> Result<Vec<Mapping>> {
        let rows = sqlx::query_as::<_, MappingRow>(
            "SELECT * FROM mappings WHERE cluster_id = $1 AND active = 1 ORDER BY priority, id",
        )
        .bind(cluster_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MappingRow::into_domain).collect()
    }

    #[instrument(skip(self, tx), fields(cluster_id = %cluster_id))]
    pub async fn list_active_by_cluster_in_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        cluster_id: &ClusterId,
    ) -> Result<Vec<Mapping>> {
        let rows = sqlx::query_as::<_, MappingRow>(
            "SELECT * FROM mappings WHERE cluster_id = $1 AND active = 1 ORDER BY priority, id",
        )
        .bind(cluster_id.as_str())
        .fetch_all(&mut **tx)
        .await?;
        rows.into_iter().map(MappingRow::into_domain).collect()
    }

    #[instrument(skip(self, mapping), fields(mapping_id = %mapping.id))]
    pub async fn update(&self, mapping: &Mapping) -> Result<()> {
        let source_services_json = serde_json::to_string(&mapping.source_services.iter().map(|s| s.as_str()).collect::<Vec<_>>())?;
        let destination_services_json =
            serde_json::to_string(&mapping.destination_services.iter().map(|s| s.as_str()).collect::<Vec<_>>())?;
        let ports_json = serde_json::to_string(&mapping.ports)?;
        let protocols_json = serde_json::to_string(&mapping.protocols)?;

        sqlx::query(
            "UPDATE mappings SET name=$1, source_services_json=$2, destination_services_json=$3, ports_json=$4,
             protocols_json=$5, auth_required=$6, priority=$7, active=$8, updated_at=$9 WHERE id=$10",
        )
        .bind(&mapping.name)
        .bind(source_services_json)
        .bind(destination_services_json)
        .bind(ports_json)
        .bind(protocols_json)
        .bind(mapping.auth_required)
        .bind(mapping.priority)
        .bind(mapping.active)
        .bind(mapping.updated_at)
        .bind(mapping.id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

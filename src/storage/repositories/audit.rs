//! Audit log repository: records control-plane mutations and security
//! events (key rotations, registration failures, license transitions).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

use crate::errors::Result;
use crate::storage::DbPool;

/// A single audit event to be persisted verbatim; never carries secret
/// material, only identifiers and descriptive metadata.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub event_type: String,
    pub actor: String,
    pub target_type: String,
    pub target_id: String,
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    pub fn new(event_type: impl Into<String>, actor: impl Into<String>, target_type: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            actor: actor.into(),
            target_type: target_type.into(),
            target_id: target_id.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, FromRow)]
struct AuditRow {
    id: String,
    event_type: String,
    actor: String,
    target_type: String,
    target_id: String,
    metadata_json: String,
    created_at: DateTime<Utc>,
}

/// A persisted audit row, read back for operator audit-log surfaces.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditRecord {
    pub id: String,
    pub event_type: String,
    pub actor: String,
    pub target_type: String,
    pub target_id: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditRow {
    fn into_record(self) -> Result<AuditRecord> {
        Ok(AuditRecord {
            id: self.id,
            event_type: self.event_type,
            actor: self.actor,
            target_type: self.target_type,
            target_id: self.target_id,
            metadata: serde_json::from_str(&self.metadata_json)?,
            created_at: self.created_at,
        })
    }
}

#[derive(Clone)]
pub struct AuditLogRepository {
    pool: DbPool,
}

impl AuditLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, event), fields(event_type = %event.event_type, target_id = %event.target_id))]
    pub async fn record(&self, event: AuditEvent) -> Result<()> {
        let metadata_json = serde_json::to_string(&event.metadata)?;
        sqlx::query(
            "INSERT INTO audit_log (id, event_type, actor, target_type, target_id, metadata_json, created_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&event.event_type)
        .bind(&event.actor)
        .bind(&event.target_type)
        .bind(&event.target_id)
        .bind(metadata_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(target_type = target_type, target_id = target_id))]
    pub async fn list_for_target(&self, target_type: &str, target_id: &str) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT * FROM audit_log WHERE target_type = $1 AND target_id = $2 ORDER BY created_at DESC",
        )
        .bind(target_type)
        .bind(target_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AuditRow::into_record).collect()
    }

    #[instrument(skip(self))]
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query_as::<_, AuditRow>("SELECT * FROM audit_log ORDER BY created_at DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AuditRow::into_record).collect()
    }
}

//! License repository.
//!
//! Singleton-shaped: in practice a single row is active at a time (one
//! license key per control plane), but the table allows history to
//! accumulate across key rotations.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

use crate::domain::license::{LicenseState, LicenseTier};
use crate::domain::{LicenseId, LicenseRecord};
use crate::errors::{MarchProxyError, Result};
use crate::storage::DbPool;

#[derive(Debug, FromRow)]
struct LicenseRow {
    id: String,
    license_key: String,
    tier: String,
    state_json: String,
    max_proxies: i64,
    features_json: String,
    expires_at: Option<DateTime<Utc>>,
    last_keepalive: Option<DateTime<Utc>>,
    grace_period_seconds: i64,
    updated_at: DateTime<Utc>,
}

impl LicenseRow {
    fn into_domain(self) -> Result<LicenseRecord> {
        let tier = match self.tier.as_str() {
            "community" => LicenseTier::Community,
            "enterprise" => LicenseTier::Enterprise,
            other => return Err(MarchProxyError::internal(format!("unknown license tier in store: {other}"))),
        };
        let state: LicenseState = serde_json::from_str(&self.state_json)?;
        let features: HashSet<String> = serde_json::from_str(&self.features_json)?;
        Ok(LicenseRecord {
            id: LicenseId::from_string(self.id),
            license_key: self.license_key,
            tier,
            state,
            max_proxies: self.max_proxies,
            features,
            expires_at: self.expires_at,
            last_keepalive: self.last_keepalive,
            grace_period_seconds: self.grace_period_seconds,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct LicenseRepository {
    pool: DbPool,
}

impl LicenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, record), fields(license_id = %record.id))]
    pub async fn upsert(&self, record: &LicenseRecord) -> Result<()> {
        let tier = match record.tier {
            LicenseTier::Community => "community",
            LicenseTier::Enterprise => "enterprise",
        };
        let state_json = serde_json::to_string(&record.state)?;
        let features_json = serde_json::to_string(&record.features)?;

        sqlx::query(
            "INSERT INTO licenses (id, license_key, tier, state_json, max_proxies, features_json, expires_at, last_keepalive, grace_period_seconds, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
             ON CONFLICT (id) DO UPDATE SET license_key=excluded.license_key, tier=excluded.tier, state_json=excluded.state_json,
             max_proxies=excluded.max_proxies, features_json=excluded.features_json, expires_at=excluded.expires_at,
             last_keepalive=excluded.last_keepalive, grace_period_seconds=excluded.grace_period_seconds, updated_at=excluded.updated_at",
        )
        .bind(record.id.as_str())
        .bind(&record.license_key)
        .bind(tier)
        .bind(state_json)
        .bind(record.max_proxies)
        .bind(features_json)
        .bind(record.expires_at)
        .bind(record.last_keepalive)
        .bind(record.grace_period_seconds)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The most recently updated license record, if any has ever been
    /// cached. Absence means the control plane is running on the
    /// community default.
    #[instrument(skip(self))]
    pub async fn get_current(&self) -> Result<Option<LicenseRecord>> {
        let row = sqlx::query_as::<_, LicenseRow>("SELECT * FROM licenses ORDER BY updated_at DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(LicenseRow::into_domain).transpose()
    }

    #[instrument(skip(self), fields(license_id = %id))]
    pub async fn get_by_id(&self, id: &LicenseId) -> Result<LicenseRecord> {
        let row = sqlx::query_as::<_, LicenseRow>("SELECT * FROM licenses WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| MarchProxyError::not_found("license", id.as_str()))?;
        row.into_domain()
    }
}

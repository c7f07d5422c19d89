//! Certificate repository.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

use crate::domain::certificate::{CertificateSource, CertificateType, RevocationState};
use crate::domain::{Certificate, CertificateId, ClusterId};
use crate::errors::{MarchProxyError, Result};
use crate::storage::DbPool;

#[derive(Debug, FromRow)]
struct CertificateRow {
    id: String,
    cluster_id: Option<String>,
    name: String,
    certificate_type: String,
    subject: String,
    issuer: String,
    serial_number: String,
    fingerprint_sha256: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    source: String,
    auto_rotate: bool,
    rotation_threshold_days: i64,
    last_rotation_attempt: Option<DateTime<Utc>>,
    rotation_error: Option<String>,
    active: bool,
    revocation_json: String,
    pem: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CertificateRow {
    fn into_domain(self) -> Result<Certificate> {
        let certificate_type = match self.certificate_type.as_str() {
            "ca" => CertificateType::Ca,
            "server" => CertificateType::Server,
            "client" => CertificateType::Client,
            other => return Err(MarchProxyError::internal(format!("unknown certificate_type in store: {other}"))),
        };
        let source = match self.source.as_str() {
            "upload" => CertificateSource::Upload,
            "issuer_a" => CertificateSource::IssuerA,
            "issuer_b" => CertificateSource::IssuerB,
            other => return Err(MarchProxyError::internal(format!("unknown certificate source in store: {other}"))),
        };
        let revocation: RevocationState = serde_json::from_str(&self.revocation_json)?;
        Ok(Certificate {
            id: CertificateId::from_string(self.id),
            cluster_id: self.cluster_id.map(ClusterId::from_string),
            name: self.name,
            certificate_type,
            subject: self.subject,
            issuer: self.issuer,
            serial_number: self.serial_number,
            fingerprint_sha256: self.fingerprint_sha256,
            not_before: self.not_before,
            not_after: self.not_after,
            source,
            auto_rotate: self.auto_rotate,
            rotation_threshold_days: self.rotation_threshold_days as i32,
            last_rotation_attempt: self.last_rotation_attempt,
            rotation_error: self.rotation_error,
            active: self.active,
            revocation,
            pem: self.pem,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct CertificateRepository {
    pool: DbPool,
}

impl CertificateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, certificate), fields(certificate_id = %certificate.id))]
    pub async fn create(&self, certificate: &Certificate) -> Result<()> {
        let certificate_type = match certificate.certificate_type {
            CertificateType::Ca => "ca",
            CertificateType::Server => "server",
            CertificateType::Client => "client",
        };
        let source = match certificate.source {
            CertificateSource::Upload => "upload",
            CertificateSource::IssuerA => "issuer_a",
            CertificateSource::IssuerB => "issuer_b",
        };
        let revocation_json = serde_json::to_string(&certificate.revocation)?;

        sqlx::query(
            "INSERT INTO certificates (id, cluster_id, name, certificate_type, subject, issuer, serial_number, fingerprint_sha256,
             not_before, not_after, source, auto_rotate, rotation_threshold_days, last_rotation_attempt, rotation_error,
             active, revocation_json, pem, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20)",
        )
        .bind(certificate.id.as_str())
        .bind(certificate.cluster_id.as_ref().map(|c| c.as_str()))
        .bind(&certificate.name)
        .bind(certificate_type)
        .bind(&certificate.subject)
        .bind(&certificate.issuer)
        .bind(&certificate.serial_number)
        .bind(&certificate.fingerprint_sha256)
        .bind(certificate.not_before)
        .bind(certificate.not_after)
        .bind(source)
        .bind(certificate.auto_rotate)
        .bind(certificate.rotation_threshold_days)
        .bind(certificate.last_rotation_attempt)
        .bind(&certificate.rotation_error)
        .bind(certificate.active)
        .bind(revocation_json)
        .bind(&certificate.pem)
        .bind(certificate.created_at)
        .bind(certificate.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(certificate_id = %id))]
    pub async fn get_by_id(&self, id: &CertificateId) -> Result<Certificate> {
        let row = sqlx::query_as::<_, CertificateRow>("SELECT * FROM certificates WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| MarchProxyError::not_found("certificate", id.as_str()))?;
        row.into_domain()
    }

    /// Active, unrevoked certificates relevant to a cluster: those scoped to
    /// it plus shared (cluster-less) CA bundles.
    #[instrument(skip(self), fields(cluster_id = %cluster_id))]
    pub async fn list_active_for_cluster(&self, cluster_id: &ClusterId) -> Result<Vec<Certificate>> {
        let rows = sqlx::query_as::<_, CertificateRow>(
            "SELECT * FROM certificates WHERE active = 1 AND (cluster_id = $1 OR cluster_id IS NULL) ORDER BY id",
        )
        .bind(cluster_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(CertificateRow::into_domain)
            .collect::<Result<Vec<_>>>()
            .map(|certs| certs.into_iter().filter(|c| !c.revocation.is_revoked()).collect())
    }

    #[instrument(skip(self, tx), fields(cluster_id = %cluster_id))]
    pub async fn list_active_for_cluster_in_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        cluster_id: &ClusterId,
    ) -> Result<Vec<Certificate>> {
        let rows = sqlx::query_as::<_, CertificateRow>(
            "SELECT * FROM certificates WHERE active = 1 AND (cluster_id = $1 OR cluster_id IS NULL) ORDER BY id",
        )
        .bind(cluster_id.as_str())
        .fetch_all(&mut **tx)
        .await?;
        rows.into_iter()
            .map(CertificateRow::into_domain)
            .collect::<Result<Vec<_>>>()
            .map(|certs| certs.into_iter().filter(|c| !c.revocation.is_revoked()).collect())
    }

    /// All certificates eligible for the auto-rotation sweep (issuer-backed,
    /// flagged, active, regardless of cluster scope).
    #[instrument(skip(self))]
    pub async fn list_auto_rotate_candidates(&self) -> Result<Vec<Certificate>> {
        let rows = sqlx::query_as::<_, CertificateRow>(
            "SELECT * FROM certificates WHERE active = 1 AND auto_rotate = 1 AND source != 'upload'",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CertificateRow::into_domain).collect()
    }

    #[instrument(skip(self, certificate), fields(certificate_id = %certificate.id))]
    pub async fn update(&self, certificate: &Certificate) -> Result<()> {
        let revocation_json = serde_json::to_string(&certificate.revocation)?;
        sqlx::query(
            "UPDATE certificates SET subject=$1, issuer=$2, serial_number=$3, fingerprint_sha256=$4, not_before=$5,
             not_after=$6, auto_rotate=$7, rotation_threshold_days=$8, last_rotation_attempt=$9, rotation_error=$10,
             active=$11, revocation_json=$12, pem=$13, updated_at=$14 WHERE id=$15",
        )
        .bind(&certificate.subject)
        .bind(&certificate.issuer)
        .bind(&certificate.serial_number)
        .bind(&certificate.fingerprint_sha256)
        .bind(certificate.not_before)
        .bind(certificate.not_after)
        .bind(certificate.auto_rotate)
        .bind(certificate.rotation_threshold_days)
        .bind(certificate.last_rotation_attempt)
        .bind(&certificate.rotation_error)
        .bind(certificate.active)
        .bind(revocation_json)
        .bind(&certificate.pem)
        .bind(certificate.updated_at)
        .bind(certificate.id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

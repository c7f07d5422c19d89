//! Service repository.
//!
//! `token_value`/`secret` auth material is encrypted at rest (AES-256-GCM,
//! see [`crate::services::secret_encryption`]); the domain [`AuthType`]
//! callers see always holds plaintext, the JSON persisted to
//! `auth_type_json` never does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::instrument;

use crate::domain::service::{HealthCheckSettings, SecretValue, SignedTokenAlgorithm, Transport};
use crate::domain::{AuthType, ClusterId, Service, ServiceId};
use crate::errors::{MarchProxyError, Result};
use crate::services::secret_encryption::SecretEncryption;
use crate::storage::DbPool;

/// On-disk shape of [`AuthType`]: identical structure, secret fields
/// replaced with their encrypted-and-encoded form.
#[derive(Serialize, Deserialize)]
#[serde(tag = "auth_type", rename_all = "snake_case")]
enum StoredAuthType {
    None,
    SymmetricToken { token_value_encrypted: String },
    SignedToken { secret_encrypted: String, expiry_seconds: i64, algorithm: SignedTokenAlgorithm },
}

fn encode_auth_type(auth_type: &AuthType, encryption: &SecretEncryption) -> Result<String> {
    let stored = match auth_type {
        AuthType::None => StoredAuthType::None,
        AuthType::SymmetricToken { token_value } => {
            StoredAuthType::SymmetricToken { token_value_encrypted: encryption.encrypt_to_string(token_value.expose())? }
        }
        AuthType::SignedToken { secret, expiry_seconds, algorithm } => StoredAuthType::SignedToken {
            secret_encrypted: encryption.encrypt_to_string(secret.expose())?,
            expiry_seconds: *expiry_seconds,
            algorithm: *algorithm,
        },
    };
    Ok(serde_json::to_string(&stored)?)
}

fn decode_auth_type(json: &str, encryption: &SecretEncryption) -> Result<AuthType> {
    let stored: StoredAuthType = serde_json::from_str(json)?;
    Ok(match stored {
        StoredAuthType::None => AuthType::None,
        StoredAuthType::SymmetricToken { token_value_encrypted } => {
            AuthType::SymmetricToken { token_value: SecretValue::new(encryption.decrypt_from_string(&token_value_encrypted)?) }
        }
        StoredAuthType::SignedToken { secret_encrypted, expiry_seconds, algorithm } => {
            AuthType::SignedToken { secret: SecretValue::new(encryption.decrypt_from_string(&secret_encrypted)?), expiry_seconds, algorithm }
        }
    })
}

#[derive(Debug, FromRow)]
struct ServiceRow {
    id: String,
    cluster_id: String,
    name: String,
    host: String,
    port: i64,
    transport: String,
    auth_type_json: String,
    tls_enabled: bool,
    tls_verify: bool,
    health_check_json: String,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ServiceRow {
    fn into_domain(self, encryption: &SecretEncryption) -> Result<Service> {
        let transport = match self.transport.as_str() {
            "tcp" => Transport::Tcp,
            "udp" => Transport::Udp,
            other => return Err(MarchProxyError::internal(format!("unknown transport in store: {other}"))),
        };
        let auth_type = decode_auth_type(&self.auth_type_json, encryption)?;
        let health_check: HealthCheckSettings = serde_json::from_str(&self.health_check_json)?;
        Ok(Service {
            id: ServiceId::from_string(self.id),
            cluster_id: ClusterId::from_string(self.cluster_id),
            name: self.name,
            host: self.host,
            port: self.port as i32,
            transport,
            auth_type,
            tls_enabled: self.tls_enabled,
            tls_verify: self.tls_verify,
            health_check,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct ServiceRepository {
    pool: DbPool,
    encryption: SecretEncryption,
}

impl ServiceRepository {
    pub fn new(pool: DbPool, encryption: SecretEncryption) -> Self {
        Self { pool, encryption }
    }

    #[instrument(skip(self, service), fields(service_id = %service.id))]
    pub async fn create(&self, service: &Service) -> Result<()> {
        let transport = match service.transport {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
        };
        let auth_type_json = encode_auth_type(&service.auth_type, &self.encryption)?;
        let health_check_json = serde_json::to_string(&service.health_check)?;

        sqlx::query(
            "INSERT INTO services (id, cluster_id, name, host, port, transport, auth_type_json, tls_enabled, tls_verify, health_check_json, active, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
        )
        .bind(service.id.as_str())
        .bind(service.cluster_id.as_str())
        .bind(&service.name)
        .bind(&service.host)
        .bind(service.port)
        .bind(transport)
        .bind(auth_type_json)
        .bind(service.tls_enabled)
        .bind(service.tls_verify)
        .bind(health_check_json)
        .bind(service.active)
        .bind(service.created_at)
        .bind(service.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Used at startup to decide whether an encryption key is required --
    /// a non-empty store can hold secrets encrypted under a key already lost
    /// if one is generated fresh on every restart.
    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM services").fetch_one(&self.pool).await?;
        Ok(row.0)
    }

    #[instrument(skip(self), fields(service_id = %id))]
    pub async fn get_by_id(&self, id: &ServiceId) -> Result<Service> {
        let row = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| MarchProxyError::not_found("service", id.as_str()))?;
        row.into_domain(&self.encryption)
    }

    #[instrument(skip(self), fields(cluster_id = %cluster_id))]
    pub async fn list_active_by_cluster(&self, cluster_id: &ClusterId) -> Result<Vec<Service>> {
        let rows = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services WHERE cluster_id = $1 AND active = 1 ORDER BY id")
            .bind(cluster_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|row| row.into_domain(&self.encryption)).collect()
    }

    /// Same query, readable from inside a transaction so the Config
    /// Distributor's render is a single consistent read.
    #[instrument(skip(self, tx), fields(cluster_id = %cluster_id))]
    pub async fn list_active_by_cluster_in_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        cluster_id: &ClusterId,
    ) -> Result<Vec<Service>> {
        let rows = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services WHERE cluster_id = $1 AND active = 1 ORDER BY id")
            .bind(cluster_id.as_str())
            .fetch_all(&mut **tx)
            .await?;
        rows.into_iter().map(|row| row.into_domain(&self.encryption)).collect()
    }

    /// Persists `service`, re-encrypting its auth material under the current
    /// key. Because the prior ciphertext is simply overwritten, rotating a
    /// service's secret via this path immediately invalidates any token
    /// derived from the old plaintext once the update commits.
    #[instrument(skip(self, service), fields(service_id = %service.id))]
    pub async fn update(&self, service: &Service) -> Result<()> {
        let auth_type_json = encode_auth_type(&service.auth_type, &self.encryption)?;
        let health_check_json = serde_json::to_string(&service.health_check)?;
        sqlx::query(
            "UPDATE services SET host=$1, port=$2, auth_type_json=$3, tls_enabled=$4, tls_verify=$5,
             health_check_json=$6, active=$7, updated_at=$8 WHERE id=$9",
        )
        .bind(&service.host)
        .bind(service.port)
        .bind(auth_type_json)
        .bind(service.tls_enabled)
        .bind(service.tls_verify)
        .bind(health_check_json)
        .bind(service.active)
        .bind(service.updated_at)
        .bind(service.id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::SignedTokenAlgorithm;
    use crate::storage::test_helpers::TestDatabase;

    fn encryption() -> SecretEncryption {
        SecretEncryption::for_testing()
    }

    #[tokio::test]
    async fn symmetric_token_round_trips_through_encrypted_storage() {
        let db = TestDatabase::new("service_repo_symmetric").await;
        let repo = ServiceRepository::new(db.pool.clone(), encryption());

        let cluster_id = ClusterId::new();
        let mut service = Service::new(cluster_id, "svc", "10.0.0.5", 8443, Transport::Tcp);
        service.auth_type = AuthType::SymmetricToken { token_value: SecretValue::new("super-secret-token") };
        repo.create(&service).await.unwrap();

        let fetched = repo.get_by_id(&service.id).await.unwrap();
        match fetched.auth_type {
            AuthType::SymmetricToken { token_value } => assert_eq!(token_value.expose(), "super-secret-token"),
            other => panic!("unexpected auth type: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ciphertext_on_disk_never_contains_the_plaintext_secret() {
        let db = TestDatabase::new("service_repo_ciphertext").await;
        let repo = ServiceRepository::new(db.pool.clone(), encryption());

        let mut service = Service::new(ClusterId::new(), "svc", "10.0.0.6", 9443, Transport::Tcp);
        service.auth_type =
            AuthType::SignedToken { secret: SecretValue::new("do-not-leak-me"), expiry_seconds: 300, algorithm: SignedTokenAlgorithm::Hs256 };
        repo.create(&service).await.unwrap();

        let (auth_type_json,): (String,) = sqlx::query_as("SELECT auth_type_json FROM services WHERE id = $1")
            .bind(service.id.as_str())
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert!(!auth_type_json.contains("do-not-leak-me"));
    }

    #[tokio::test]
    async fn rotating_secret_replaces_ciphertext_so_the_old_plaintext_is_unrecoverable() {
        let db = TestDatabase::new("service_repo_rotate").await;
        let repo = ServiceRepository::new(db.pool.clone(), encryption());

        let mut service = Service::new(ClusterId::new(), "svc", "10.0.0.7", 8080, Transport::Tcp);
        service.auth_type = AuthType::SymmetricToken { token_value: SecretValue::new("old-secret") };
        repo.create(&service).await.unwrap();

        service.rotate_secret(AuthType::SymmetricToken { token_value: SecretValue::new("new-secret") });
        repo.update(&service).await.unwrap();

        let fetched = repo.get_by_id(&service.id).await.unwrap();
        match fetched.auth_type {
            AuthType::SymmetricToken { token_value } => assert_eq!(token_value.expose(), "new-secret"),
            other => panic!("unexpected auth type: {other:?}"),
        }
    }
}

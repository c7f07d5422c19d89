//! Service: an addressable upstream target, including the auth material the
//! Service Authenticator enforces on the data-plane side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::id::{ClusterId, ServiceId};

/// Transport the service's auth and health-check settings apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
}

/// HMAC algorithm permitted for signed tokens. Only HS256 is accepted by the
/// authenticator; the field still exists so a rejected algorithm can be
/// reported rather than silently assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignedTokenAlgorithm {
    Hs256,
}

/// A secret value that is redacted in `Debug` output and never serialized by
/// default; callers that need the plaintext (config-snapshot rendering,
/// encryption at rest) use `expose()` explicitly.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue(REDACTED)")
    }
}

impl Serialize for SecretValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self(String::deserialize(deserializer)?))
    }
}

/// Models "exactly one auth_type's secret material is populated" as an enum
/// variant rather than a struct with optional fields for every kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "auth_type", rename_all = "snake_case")]
pub enum AuthType {
    None,
    SymmetricToken { token_value: SecretValue },
    SignedToken { secret: SecretValue, expiry_seconds: i64, algorithm: SignedTokenAlgorithm },
}

impl AuthType {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthType::None => "none",
            AuthType::SymmetricToken { .. } => "symmetric_token",
            AuthType::SignedToken { .. } => "signed_token",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckSettings {
    pub enabled: bool,
    pub interval_seconds: i64,
    pub timeout_seconds: i64,
    pub path: Option<String>,
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self { enabled: false, interval_seconds: 10, timeout_seconds: 2, path: None }
    }
}

/// An addressable upstream target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub cluster_id: ClusterId,
    pub name: String,
    pub host: String,
    pub port: i32,
    pub transport: Transport,
    pub auth_type: AuthType,
    pub tls_enabled: bool,
    pub tls_verify: bool,
    pub health_check: HealthCheckSettings,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    pub fn new(
        cluster_id: ClusterId,
        name: impl Into<String>,
        host: impl Into<String>,
        port: i32,
        transport: Transport,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ServiceId::new(),
            cluster_id,
            name: name.into(),
            host: host.into(),
            port,
            transport,
            auth_type: AuthType::None,
            tls_enabled: false,
            tls_verify: true,
            health_check: HealthCheckSettings::default(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces this service's auth secret material. Because the previous
    /// `AuthType` is dropped in its entirety, any previously issued token is
    /// immediately unverifiable once the owning repository persists this
    /// change.
    pub fn rotate_secret(&mut self, new_auth_type: AuthType) {
        self.auth_type = new_auth_type;
        self.updated_at = Utc::now();
    }
}

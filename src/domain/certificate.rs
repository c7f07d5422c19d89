//! Certificate: PEM-encoded cryptographic material tracked by the control
//! plane and distributed to proxies as mTLS material or CA bundles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{CertificateId, ClusterId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateType {
    Ca,
    Server,
    Client,
}

/// Where a certificate's material originates. Only issuer-backed
/// certificates are eligible for auto-rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateSource {
    Upload,
    IssuerA,
    IssuerB,
}

impl CertificateSource {
    pub fn supports_auto_rotate(&self) -> bool {
        !matches!(self, CertificateSource::Upload)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RevocationState {
    NotRevoked,
    Revoked { reason: String, at: DateTime<Utc> },
}

impl RevocationState {
    pub fn is_revoked(&self) -> bool {
        matches!(self, RevocationState::Revoked { .. })
    }
}

/// PEM-encoded cryptographic material.
///
/// Invariant: uploaded certificates cannot be auto-renewed; issuer-backed
/// certificates may be (enforced by `CertificateSource::supports_auto_rotate`
/// at the point auto-rotate is toggled on).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    /// Absent for CA bundles shared across every cluster; present for
    /// cluster-scoped server/client material.
    pub cluster_id: Option<ClusterId>,
    pub name: String,
    pub certificate_type: CertificateType,
    pub subject: String,
    pub issuer: String,
    pub serial_number: String,
    pub fingerprint_sha256: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub source: CertificateSource,
    pub auto_rotate: bool,
    pub rotation_threshold_days: i32,
    pub last_rotation_attempt: Option<DateTime<Utc>>,
    pub rotation_error: Option<String>,
    pub active: bool,
    pub revocation: RevocationState,
    /// PEM body. Never logged; only ever rendered into a config snapshot
    /// served over the already-authenticated control-plane API.
    #[serde(skip_serializing)]
    pub pem: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certificate {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.not_after
    }

    pub fn is_within_validity(&self, now: DateTime<Utc>) -> bool {
        now >= self.not_before && now <= self.not_after
    }

    /// Eligibility for auto-rotation requires both an issuer-backed source
    /// and the per-certificate flag to be set.
    pub fn eligible_for_auto_rotate(&self) -> bool {
        self.auto_rotate && self.source.supports_auto_rotate()
    }

    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.not_after - now).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(source: CertificateSource) -> Certificate {
        let now = Utc::now();
        Certificate {
            id: CertificateId::new(),
            cluster_id: None,
            name: "test".into(),
            certificate_type: CertificateType::Server,
            subject: "CN=test".into(),
            issuer: "CN=ca".into(),
            serial_number: "01".into(),
            fingerprint_sha256: "deadbeef".into(),
            not_before: now - chrono::Duration::days(1),
            not_after: now + chrono::Duration::days(30),
            source,
            auto_rotate: true,
            rotation_threshold_days: 7,
            last_rotation_attempt: None,
            rotation_error: None,
            active: true,
            revocation: RevocationState::NotRevoked,
            pem: "-----BEGIN CERTIFICATE-----".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn uploaded_certs_never_auto_rotate_even_if_flag_set() {
        let c = cert(CertificateSource::Upload);
        assert!(!c.eligible_for_auto_rotate());
    }

    #[test]
    fn issuer_backed_certs_can_auto_rotate() {
        let c = cert(CertificateSource::IssuerA);
        assert!(c.eligible_for_auto_rotate());
    }

    #[test]
    fn revoked_state_is_detected() {
        let mut c = cert(CertificateSource::Upload);
        assert!(!c.revocation.is_revoked());
        c.revocation = RevocationState::Revoked { reason: "compromised".into(), at: Utc::now() };
        assert!(c.revocation.is_revoked());
    }
}

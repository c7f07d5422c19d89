//! mTLS Validator: additional checks on a presented client certificate,
//! beyond whatever standard chain verification the TLS stack already did --
//! validity window, allowed CNs/OUs, chain depth, revocation, and an
//! optional custom hook.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use tracing::warn;

use crate::errors::{DataplaneError, MtlsRejection, Result};

/// Fields extracted from a presented client certificate via `x509-parser`.
/// The validator never holds the raw DER beyond extraction.
#[derive(Debug, Clone)]
pub struct ParsedCert {
    pub serial: String,
    pub common_name: Option<String>,
    pub organizational_units: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub chain_depth: u32,
}

/// Parses a DER-encoded client certificate into the fields the validator
/// checks. Chain depth is supplied by the caller (the TLS stack's handshake
/// context), not derived from the leaf certificate alone.
pub fn parse_presented_cert(der: &[u8], chain_depth: u32) -> Result<ParsedCert> {
    let (_, cert) =
        x509_parser::parse_x509_certificate(der).map_err(|_| DataplaneError::Mtls(MtlsRejection::Invalid))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(|s| s.to_string());

    let organizational_units = cert
        .subject()
        .iter_organizational_unit()
        .filter_map(|ou| ou.as_str().ok())
        .map(|s| s.to_string())
        .collect();

    let validity = cert.validity();
    let not_before = DateTime::from_timestamp(validity.not_before.timestamp(), 0)
        .ok_or(DataplaneError::Mtls(MtlsRejection::Invalid))?;
    let not_after = DateTime::from_timestamp(validity.not_after.timestamp(), 0)
        .ok_or(DataplaneError::Mtls(MtlsRejection::Invalid))?;

    Ok(ParsedCert {
        serial: cert.raw_serial_as_string(),
        common_name,
        organizational_units,
        not_before,
        not_after,
        chain_depth,
    })
}

/// Per-handshake policy. `allowed_cns`/`allowed_ous` empty means unrestricted.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub allowed_cns: Vec<String>,
    pub allowed_ous: Vec<String>,
    pub max_cert_chain_depth: u32,
    pub expired_grace: Duration,
}

impl Default for TlsMaterial {
    fn default() -> Self {
        Self { allowed_cns: Vec::new(), allowed_ous: Vec::new(), max_cert_chain_depth: 5, expired_grace: Duration::ZERO }
    }
}

/// Revoked serial numbers, refreshed from the same config-pull path as the
/// rest of a proxy's config snapshot.
#[derive(Default)]
pub struct RevocationList {
    revoked: DashSet<String>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&self, serial: impl Into<String>) {
        self.revoked.insert(serial.into());
    }

    pub fn is_revoked(&self, serial: &str) -> bool {
        self.revoked.contains(serial)
    }

    pub fn replace(&self, serials: impl IntoIterator<Item = String>) {
        self.revoked.clear();
        for serial in serials {
            self.revoked.insert(serial);
        }
    }
}

#[derive(Default)]
pub struct MtlsMetrics {
    pub successes: AtomicU64,
    pub failures: AtomicU64,
    pub expired: AtomicU64,
    pub revoked: AtomicU64,
    pub invalid: AtomicU64,
    pub missing: AtomicU64,
    /// Reserved: nothing in this validator's reachable paths increments
    /// this today, since chain verification happens in the TLS stack before
    /// the validator ever sees a certificate. The field and its metric
    /// export stay in place rather than being silently dropped.
    pub ca_validation_errors: AtomicU64,
    pub chain_too_long: AtomicU64,
    pub custom_validation_failures: AtomicU64,
    /// Running total of `validate` wall time in microseconds, divided by
    /// `handshake_count` to report an average. Covers the validator's own
    /// checks only, not the TLS handshake or chain verification that
    /// happens before a `ParsedCert` ever reaches `validate`.
    total_latency_us: AtomicU64,
    handshake_count: AtomicU64,
}

impl MtlsMetrics {
    /// Mean time spent in `validate` across every call so far, or zero
    /// before the first one.
    pub fn average_handshake_latency(&self) -> Duration {
        let count = self.handshake_count.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.total_latency_us.load(Ordering::Relaxed) / count)
    }
}

type CustomVerifyHook = dyn Fn(&ParsedCert) -> bool + Send + Sync;

/// Validates presented certificates against a hot-swappable [`TlsMaterial`].
/// `reload` replaces the policy atomically via `arc-swap`, so in-flight
/// handshakes never observe a half-updated configuration.
pub struct MtlsValidator {
    material: ArcSwap<TlsMaterial>,
    revocation: Arc<RevocationList>,
    custom_verify: Option<Arc<CustomVerifyHook>>,
    metrics: MtlsMetrics,
}

impl MtlsValidator {
    pub fn new(material: TlsMaterial, revocation: Arc<RevocationList>) -> Self {
        Self { material: ArcSwap::from_pointee(material), revocation, custom_verify: None, metrics: MtlsMetrics::default() }
    }

    pub fn with_custom_verify(mut self, hook: impl Fn(&ParsedCert) -> bool + Send + Sync + 'static) -> Self {
        self.custom_verify = Some(Arc::new(hook));
        self
    }

    /// Atomically replaces the validator's policy. Safe to call while
    /// handshakes are validating concurrently.
    pub fn reload(&self, material: TlsMaterial) {
        self.material.store(Arc::new(material));
    }

    pub fn metrics(&self) -> &MtlsMetrics {
        &self.metrics
    }

    pub fn validate(&self, cert: &ParsedCert) -> Result<()> {
        let started = Instant::now();
        let result = self.validate_checks(cert);
        let elapsed = started.elapsed();
        self.metrics.total_latency_us.fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.metrics.handshake_count.fetch_add(1, Ordering::Relaxed);
        result
    }

    fn validate_checks(&self, cert: &ParsedCert) -> Result<()> {
        let material = self.material.load();
        let now = Utc::now();

        if self.revocation.is_revoked(&cert.serial) {
            self.metrics.revoked.fetch_add(1, Ordering::Relaxed);
            self.metrics.failures.fetch_add(1, Ordering::Relaxed);
            return Err(DataplaneError::Mtls(MtlsRejection::Revoked));
        }

        if now < cert.not_before {
            self.metrics.invalid.fetch_add(1, Ordering::Relaxed);
            self.metrics.failures.fetch_add(1, Ordering::Relaxed);
            return Err(DataplaneError::Mtls(MtlsRejection::Invalid));
        }

        if now > cert.not_after {
            let overage = (now - cert.not_after).to_std().unwrap_or(Duration::MAX);
            if material.expired_grace > Duration::ZERO && overage <= material.expired_grace {
                warn!(serial = %cert.serial, "accepted an expired certificate within its grace period");
            } else {
                self.metrics.expired.fetch_add(1, Ordering::Relaxed);
                self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                return Err(DataplaneError::Mtls(MtlsRejection::Expired));
            }
        }

        if !material.allowed_cns.is_empty() {
            let cn_matches = cert.common_name.as_deref().is_some_and(|cn| material.allowed_cns.iter().any(|a| a == cn));
            if !cn_matches {
                self.metrics.invalid.fetch_add(1, Ordering::Relaxed);
                self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                return Err(DataplaneError::Mtls(MtlsRejection::Invalid));
            }
        }

        if !material.allowed_ous.is_empty() {
            let ou_matches = cert.organizational_units.iter().any(|ou| material.allowed_ous.contains(ou));
            if !ou_matches {
                self.metrics.invalid.fetch_add(1, Ordering::Relaxed);
                self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                return Err(DataplaneError::Mtls(MtlsRejection::Invalid));
            }
        }

        if cert.chain_depth > material.max_cert_chain_depth {
            self.metrics.chain_too_long.fetch_add(1, Ordering::Relaxed);
            self.metrics.failures.fetch_add(1, Ordering::Relaxed);
            return Err(DataplaneError::Mtls(MtlsRejection::ChainTooLong));
        }

        if let Some(hook) = &self.custom_verify {
            if !hook(cert) {
                self.metrics.custom_validation_failures.fetch_add(1, Ordering::Relaxed);
                self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                return Err(DataplaneError::Mtls(MtlsRejection::CustomRejected));
            }
        }

        self.metrics.successes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Rejects with [`MtlsRejection::Missing`] when mTLS is required but the
    /// handshake presented no client certificate at all.
    pub fn reject_missing(&self) -> Result<()> {
        self.metrics.missing.fetch_add(1, Ordering::Relaxed);
        self.metrics.failures.fetch_add(1, Ordering::Relaxed);
        Err(DataplaneError::Mtls(MtlsRejection::Missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn cert(cn: &str, ous: &[&str], not_after_delta: ChronoDuration) -> ParsedCert {
        ParsedCert {
            serial: "AA11".to_string(),
            common_name: Some(cn.to_string()),
            organizational_units: ous.iter().map(|s| s.to_string()).collect(),
            not_before: Utc::now() - ChronoDuration::days(1),
            not_after: Utc::now() + not_after_delta,
            chain_depth: 1,
        }
    }

    fn material(cns: &[&str], ous: &[&str]) -> TlsMaterial {
        TlsMaterial {
            allowed_cns: cns.iter().map(|s| s.to_string()).collect(),
            allowed_ous: ous.iter().map(|s| s.to_string()).collect(),
            max_cert_chain_depth: 5,
            expired_grace: Duration::ZERO,
        }
    }

    #[test]
    fn accepts_a_cert_matching_the_allowed_cn_and_ou() {
        let validator = MtlsValidator::new(material(&["svc-a", "svc-b"], &["proxy"]), Arc::new(RevocationList::new()));
        let c = cert("svc-a", &["proxy"], ChronoDuration::days(10));
        assert!(validator.validate(&c).is_ok());
    }

    #[test]
    fn rejects_a_revoked_serial() {
        let revocation = Arc::new(RevocationList::new());
        revocation.revoke("AA11");
        let validator = MtlsValidator::new(material(&["svc-a"], &[]), revocation);
        let c = cert("svc-a", &[], ChronoDuration::days(10));
        let err = validator.validate(&c).unwrap_err();
        assert!(matches!(err, DataplaneError::Mtls(MtlsRejection::Revoked)));
    }

    #[test]
    fn rejects_an_expired_cert_with_no_grace() {
        let validator = MtlsValidator::new(TlsMaterial::default(), Arc::new(RevocationList::new()));
        let c = cert("svc-a", &[], ChronoDuration::seconds(-1));
        let err = validator.validate(&c).unwrap_err();
        assert!(matches!(err, DataplaneError::Mtls(MtlsRejection::Expired)));
    }

    #[test]
    fn accepts_an_expired_cert_within_grace() {
        let mut material = TlsMaterial::default();
        material.expired_grace = Duration::from_secs(2);
        let validator = MtlsValidator::new(material, Arc::new(RevocationList::new()));
        let c = cert("svc-a", &[], ChronoDuration::seconds(-1));
        assert!(validator.validate(&c).is_ok());
    }

    #[test]
    fn reload_replaces_the_policy_for_subsequent_validations() {
        let validator = MtlsValidator::new(material(&["svc-a"], &[]), Arc::new(RevocationList::new()));
        let c = cert("svc-b", &[], ChronoDuration::days(10));
        assert!(validator.validate(&c).is_err());

        validator.reload(material(&["svc-b"], &[]));
        assert!(validator.validate(&c).is_ok());
    }

    #[test]
    fn validate_records_handshake_latency_on_every_outcome() {
        let validator = MtlsValidator::new(material(&["svc-a"], &[]), Arc::new(RevocationList::new()));
        assert_eq!(validator.metrics().average_handshake_latency(), Duration::ZERO);

        let accepted = cert("svc-a", &[], ChronoDuration::days(10));
        assert!(validator.validate(&accepted).is_ok());
        let rejected = cert("svc-b", &[], ChronoDuration::days(10));
        assert!(validator.validate(&rejected).is_err());

        assert_eq!(validator.metrics().handshake_count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn rejects_a_chain_deeper_than_the_configured_maximum() {
        let mut m = TlsMaterial::default();
        m.max_cert_chain_depth = 1;
        let validator = MtlsValidator::new(m, Arc::new(RevocationList::new()));
        let mut c = cert("svc-a", &[], ChronoDuration::days(10));
        c.chain_depth = 2;
        let err = validator.validate(&c).unwrap_err();
        assert!(matches!(err, DataplaneError::Mtls(MtlsRejection::ChainTooLong)));
    }
}

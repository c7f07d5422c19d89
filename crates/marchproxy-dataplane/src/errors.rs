//! Error kinds for every per-connection enforcement primitive: the Service
//! Authenticator, Circuit Breaker Engine, and mTLS Validator. Kept distinct
//! from `marchproxy::MarchProxyError` -- this crate has no store, no HTTP
//! framework, and runs on the proxy side of the fleet, not the control plane.

use thiserror::Error;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, DataplaneError>;

#[derive(Debug, Error)]
pub enum DataplaneError {
    /// Credential missing, wrong, or expired. `reason` is for logs and
    /// metrics labels only -- callers never learn which of these occurred.
    #[error("authentication failed")]
    Auth { reason: AuthFailureReason },

    /// A breaker rejected the call without invoking the guarded work.
    #[error("circuit breaker rejected the call")]
    Breaker(#[from] BreakerRejection),

    /// The presented client certificate was rejected.
    #[error("mTLS validation failed")]
    Mtls(#[from] MtlsRejection),

    /// A poll or fetch against the control plane failed.
    #[error("control plane request failed: {context}")]
    ControlPlane { context: String, #[source] source: Option<reqwest::Error> },
}

/// Logged reason for an `Auth` rejection. Never surfaced to the remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureReason {
    ParseFailure,
    UnsupportedAlgorithm,
    BadSignature,
    ServiceMismatch,
    Expired,
    LengthMismatch,
}

impl AuthFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseFailure => "parse_failure",
            Self::UnsupportedAlgorithm => "unsupported_algorithm",
            Self::BadSignature => "bad_signature",
            Self::ServiceMismatch => "service_mismatch",
            Self::Expired => "expired",
            Self::LengthMismatch => "length_mismatch",
        }
    }
}

/// Why the circuit breaker declined to run the guarded call.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BreakerRejection {
    #[error("breaker is open")]
    Open,
    #[error("too many concurrent requests")]
    TooManyRequests,
    #[error("call timed out")]
    Timeout,
}

/// Why the mTLS validator rejected a presented certificate.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MtlsRejection {
    #[error("certificate expired")]
    Expired,
    #[error("certificate revoked")]
    Revoked,
    #[error("certificate invalid or malformed")]
    Invalid,
    #[error("no client certificate presented")]
    Missing,
    #[error("certificate authority validation failed")]
    CaInvalid,
    #[error("certificate chain exceeds the configured maximum depth")]
    ChainTooLong,
    #[error("custom validation hook rejected the certificate")]
    CustomRejected,
}

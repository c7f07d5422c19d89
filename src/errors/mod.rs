//! # Error Handling
//!
//! Comprehensive error handling for the MarchProxy control plane, defined as
//! a single `thiserror` enum whose variants map onto the error kinds the
//! core design calls out: `auth`, `capacity`, `not_found`, `conflict`,
//! `store_unavailable`, `license_invalid`, plus the ambient concerns
//! (configuration, storage, serialization) every control-plane operation can
//! hit regardless of domain.

use std::fmt;

pub mod tls;

pub use tls::TlsError;

/// Result alias used throughout the control plane.
pub type Result<T> = std::result::Result<T, MarchProxyError>;

/// Alias kept for readability at call sites (`errors::Error`).
pub type Error = MarchProxyError;

/// Main error type for the MarchProxy control plane.
#[derive(thiserror::Error, Debug)]
pub enum MarchProxyError {
    /// Configuration errors.
    #[error("Configuration error: {message}")]
    Config { message: String, #[source] source: Option<Box<dyn std::error::Error + Send + Sync>> },

    /// Database and storage errors.
    #[error("Database error: {context}")]
    Database { #[source] source: sqlx::Error, context: String },

    /// Database constraint violation, surfaced as `conflict` at the API layer.
    #[error("Database constraint violation: {message}")]
    ConstraintViolation { message: String, #[source] source: sqlx::Error },

    /// I/O errors with additional context.
    #[error("I/O error: {context}")]
    Io { #[source] source: std::io::Error, context: String },

    /// Serialization/deserialization errors.
    #[error("Serialization error: {context}")]
    Serialization { #[source] source: serde_json::Error, context: String },

    /// Validation errors.
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Credential missing, wrong, or expired. The caller only ever sees
    /// `message`; `reason` is for server-side logs and metrics labels.
    #[error("Authentication error: {message}")]
    Auth { message: String, reason: AuthErrorReason },

    /// A cluster or the license has run out of proxy capacity.
    #[error("Capacity exhausted: {message}")]
    Capacity { message: String },

    /// HTTP/API errors.
    #[error("HTTP error: {message} (status: {status})")]
    Http { message: String, status: u16 },

    /// Internal server errors.
    #[error("Internal server error: {message}")]
    Internal { message: String, #[source] source: Option<Box<dyn std::error::Error + Send + Sync>> },

    /// Resource not found errors.
    #[error("Resource not found: {resource_type} with ID '{id}'")]
    NotFound { resource_type: String, id: String },

    /// Resource conflict errors (e.g. duplicate proxy name within a cluster).
    #[error("Resource conflict: {message}")]
    Conflict { message: String, resource_type: String },

    /// The underlying store (sqlite/postgres) is unreachable or degraded;
    /// distinct from `Database`, which wraps a specific query failure.
    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// A license-gated feature or capacity check was denied.
    #[error("License invalid: {message}")]
    LicenseInvalid { message: String },

    /// Circuit breaker is open for the target service.
    #[error("Circuit breaker open: {service}")]
    BreakerOpen { service: String },

    /// Concurrency limit reached for a breaker-guarded call.
    #[error("Too many concurrent requests: {service}")]
    TooManyRequests { service: String },

    /// Timeout errors.
    #[error("Operation timed out: {operation} after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// Parsing/decoding errors.
    #[error("Parse error: {context}")]
    Parse { context: String, #[source] source: Option<Box<dyn std::error::Error + Send + Sync>> },

    /// Lock/concurrency errors.
    #[error("Synchronization error: {context}")]
    Sync { context: String },
}

/// Why an `Auth` error occurred. Never rendered in an HTTP response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorReason {
    MissingCredential,
    InvalidCredential,
    ClusterInactive,
    UnknownProxy,
    ExpiredToken,
    BadSignature,
    WrongService,
    UnsupportedAlgorithm,
    MalformedToken,
    InsufficientPermissions,
}

impl fmt::Display for AuthErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuthErrorReason::MissingCredential => "missing_credential",
            AuthErrorReason::InvalidCredential => "invalid_credential",
            AuthErrorReason::ClusterInactive => "cluster_inactive",
            AuthErrorReason::UnknownProxy => "unknown_proxy",
            AuthErrorReason::ExpiredToken => "expired_token",
            AuthErrorReason::BadSignature => "bad_signature",
            AuthErrorReason::WrongService => "wrong_service",
            AuthErrorReason::UnsupportedAlgorithm => "unsupported_algorithm",
            AuthErrorReason::MalformedToken => "malformed_token",
            AuthErrorReason::InsufficientPermissions => "insufficient_permissions",
        };
        write!(f, "{s}")
    }
}

impl MarchProxyError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    pub fn auth<S: Into<String>>(message: S, reason: AuthErrorReason) -> Self {
        Self::Auth { message: message.into(), reason }
    }

    pub fn capacity<S: Into<String>>(message: S) -> Self {
        Self::Capacity { message: message.into() }
    }

    pub fn http<S: Into<String>>(message: S, status: u16) -> Self {
        Self::Http { message: message.into(), status }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    pub fn conflict<M: Into<String>, R: Into<String>>(message: M, resource_type: R) -> Self {
        Self::Conflict { message: message.into(), resource_type: resource_type.into() }
    }

    pub fn store_unavailable<S: Into<String>>(message: S) -> Self {
        Self::StoreUnavailable { message: message.into() }
    }

    pub fn license_invalid<S: Into<String>>(message: S) -> Self {
        Self::LicenseInvalid { message: message.into() }
    }

    pub fn breaker_open<S: Into<String>>(service: S) -> Self {
        Self::BreakerOpen { service: service.into() }
    }

    pub fn too_many_requests<S: Into<String>>(service: S) -> Self {
        Self::TooManyRequests { service: service.into() }
    }

    pub fn timeout<S: Into<String>>(operation: S, duration_ms: u64) -> Self {
        Self::Timeout { operation: operation.into(), duration_ms }
    }

    pub fn parse<S: Into<String>>(context: S) -> Self {
        Self::Parse { context: context.into(), source: None }
    }

    pub fn parse_with_source<S: Into<String>>(
        context: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Parse { context: context.into(), source: Some(source) }
    }

    pub fn sync<S: Into<String>>(context: S) -> Self {
        Self::Sync { context: context.into() }
    }

    /// HTTP status this error should be surfaced as at the control-plane API layer.
    pub fn status_code(&self) -> u16 {
        match self {
            MarchProxyError::Config { .. } => 500,
            MarchProxyError::Database { .. } => 500,
            MarchProxyError::Io { .. } => 500,
            MarchProxyError::Serialization { .. } => 400,
            MarchProxyError::Validation { .. } => 400,
            MarchProxyError::Auth { .. } => 401,
            MarchProxyError::Capacity { .. } => 403,
            MarchProxyError::Http { status, .. } => *status,
            MarchProxyError::Internal { .. } => 500,
            MarchProxyError::NotFound { .. } => 404,
            MarchProxyError::Conflict { .. } => 409,
            MarchProxyError::ConstraintViolation { .. } => 409,
            MarchProxyError::StoreUnavailable { .. } => 503,
            MarchProxyError::LicenseInvalid { .. } => 402,
            MarchProxyError::BreakerOpen { .. } => 503,
            MarchProxyError::TooManyRequests { .. } => 429,
            MarchProxyError::Timeout { .. } => 408,
            MarchProxyError::Parse { .. } => 400,
            MarchProxyError::Sync { .. } => 500,
        }
    }

    /// Stable error-kind string used as a metrics label and audit-log field.
    pub fn kind(&self) -> &'static str {
        match self {
            MarchProxyError::Auth { .. } => "auth",
            MarchProxyError::Capacity { .. } => "capacity",
            MarchProxyError::NotFound { .. } => "not_found",
            MarchProxyError::Conflict { .. } | MarchProxyError::ConstraintViolation { .. } => "conflict",
            MarchProxyError::StoreUnavailable { .. } | MarchProxyError::Database { .. } => "store_unavailable",
            MarchProxyError::LicenseInvalid { .. } => "license_invalid",
            MarchProxyError::BreakerOpen { .. } => "breaker_open",
            MarchProxyError::TooManyRequests { .. } => "too_many_requests",
            MarchProxyError::Timeout { .. } => "timeout",
            _ => "internal",
        }
    }

    /// Check if this error should be retried by a calling dataplane process.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MarchProxyError::Database { .. }
                | MarchProxyError::Io { .. }
                | MarchProxyError::Timeout { .. }
                | MarchProxyError::StoreUnavailable { .. }
        )
    }
}

impl From<sqlx::Error> for MarchProxyError {
    fn from(error: sqlx::Error) -> Self {
        if let Some(db_err) = error.as_database_error() {
            if let Some(code) = db_err.code() {
                if code.as_ref().starts_with("23") || code.as_ref() == "2067" || code.as_ref() == "1555" {
                    return Self::ConstraintViolation { message: db_err.message().to_string(), source: error };
                }
            }
        }
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<std::io::Error> for MarchProxyError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for MarchProxyError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<config::ConfigError> for MarchProxyError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for MarchProxyError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");
        Self::validation(format!("Validation failed: {message}"))
    }
}

impl From<TlsError> for MarchProxyError {
    fn from(error: TlsError) -> Self {
        Self::Config { message: error.to_string(), source: None }
    }
}

impl From<uuid::Error> for MarchProxyError {
    fn from(error: uuid::Error) -> Self {
        Self::parse_with_source("UUID parsing failed", Box::new(error))
    }
}

impl From<url::ParseError> for MarchProxyError {
    fn from(error: url::ParseError) -> Self {
        Self::parse_with_source("URL parsing failed", Box::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_kinds() {
        assert_eq!(MarchProxyError::auth("x", AuthErrorReason::InvalidCredential).status_code(), 401);
        assert_eq!(MarchProxyError::capacity("x").status_code(), 403);
        assert_eq!(MarchProxyError::not_found("proxy", "p1").status_code(), 404);
        assert_eq!(MarchProxyError::conflict("x", "proxy").status_code(), 409);
        assert_eq!(MarchProxyError::store_unavailable("x").status_code(), 503);
        assert_eq!(MarchProxyError::license_invalid("x").status_code(), 402);
        assert_eq!(MarchProxyError::breaker_open("svc").status_code(), 503);
        assert_eq!(MarchProxyError::too_many_requests("svc").status_code(), 429);
    }

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(MarchProxyError::auth("x", AuthErrorReason::InvalidCredential).kind(), "auth");
        assert_eq!(MarchProxyError::capacity("x").kind(), "capacity");
        assert_eq!(MarchProxyError::not_found("a", "b").kind(), "not_found");
        assert_eq!(MarchProxyError::breaker_open("svc").kind(), "breaker_open");
    }

    #[test]
    fn auth_reason_never_leaks_into_display() {
        let err = MarchProxyError::auth("request rejected", AuthErrorReason::BadSignature);
        assert!(!err.to_string().contains("bad_signature"));
    }

    #[test]
    fn retryable_errors() {
        assert!(MarchProxyError::timeout("poll", 1000).is_retryable());
        assert!(MarchProxyError::store_unavailable("down").is_retryable());
        assert!(!MarchProxyError::validation("bad field").is_retryable());
        assert!(!MarchProxyError::not_found("cluster", "c1").is_retryable());
    }
}

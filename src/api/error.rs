//! API error type and its conversion from [`MarchProxyError`] into an HTTP
//! response with a standardized JSON body.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::errors::MarchProxyError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Conflict(String),
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        ApiError::Unauthorized(msg.into())
    }

    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        ApiError::Forbidden(msg.into())
    }

    pub fn service_unavailable<S: Into<String>>(msg: S) -> Self {
        ApiError::ServiceUnavailable(msg.into())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let error_kind = match &self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Conflict(_) => "conflict",
            ApiError::NotFound(_) => "not_found",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::Internal(_) => "internal_error",
        };

        let message = match self {
            ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::NotFound(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::Internal(msg) => msg,
        };

        (status, Json(ErrorBody { error: error_kind, message })).into_response()
    }
}

impl From<MarchProxyError> for ApiError {
    fn from(err: MarchProxyError) -> Self {
        match err {
            MarchProxyError::Validation { message, .. } => ApiError::BadRequest(message),
            MarchProxyError::NotFound { resource_type, id } => {
                ApiError::NotFound(format!("{resource_type} with ID '{id}' not found"))
            }
            MarchProxyError::Conflict { message, .. } => ApiError::Conflict(message),
            MarchProxyError::ConstraintViolation { message, .. } => ApiError::Conflict(message),
            MarchProxyError::Auth { message, .. } => ApiError::Unauthorized(message),
            MarchProxyError::Capacity { message } => ApiError::Conflict(message),
            MarchProxyError::LicenseInvalid { message } => ApiError::Forbidden(message),
            MarchProxyError::StoreUnavailable { message } => ApiError::ServiceUnavailable(message),
            MarchProxyError::BreakerOpen { service } => {
                ApiError::ServiceUnavailable(format!("circuit breaker open for {service}"))
            }
            MarchProxyError::TooManyRequests { service } => {
                ApiError::ServiceUnavailable(format!("too many concurrent requests to {service}"))
            }
            MarchProxyError::Database { context, .. } => ApiError::Internal(context),
            MarchProxyError::Config { message, .. }
            | MarchProxyError::Internal { message, .. } => ApiError::Internal(message),
            MarchProxyError::Io { context, .. } => ApiError::Internal(context),
            MarchProxyError::Serialization { context, .. } => ApiError::BadRequest(context),
            MarchProxyError::Http { message, .. } => ApiError::Internal(message),
            MarchProxyError::Timeout { operation, duration_ms } => {
                ApiError::Internal(format!("operation '{operation}' timed out after {duration_ms}ms"))
            }
            MarchProxyError::Parse { context, .. } => ApiError::BadRequest(context),
            MarchProxyError::Sync { context } => ApiError::Internal(context),
        }
    }
}

//! Health check endpoints for monitoring and readiness probes.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::api::state::AppState;
use crate::observability::health::HealthCheck;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Unauthenticated liveness probe, suitable for load balancers and
/// container orchestrators.
pub async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "ok".to_string() }))
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    ready: bool,
    checks: Vec<HealthCheck>,
}

/// Readiness probe: runs every registered [`crate::observability::health::HealthProvider`]
/// (currently just the database) and reports 503 if any is unhealthy.
pub async fn readiness_handler(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let checks = state.health.check_all().await.unwrap_or_default();
    let ready = state.health.is_ready().await;
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(ReadinessResponse { ready, checks: checks.into_values().collect() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_handler_returns_ok() {
        let (status, Json(response)) = health_handler().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.status, "ok");
    }
}

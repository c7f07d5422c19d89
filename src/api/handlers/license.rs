//! License status and manual re-validation, for operators.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::domain::LicenseRecord;

#[derive(Debug, Serialize)]
pub struct LicenseStatusResponse {
    pub max_proxies: i64,
    pub record: LicenseRecord,
}

pub async fn license_status_handler(State(state): State<AppState>) -> Json<LicenseStatusResponse> {
    let record = state.license.current().await;
    let max_proxies = state.license.capacity().await;
    Json(LicenseStatusResponse { max_proxies, record })
}

#[derive(Debug, Deserialize)]
pub struct ValidateLicenseRequest {
    pub license_key: String,
    #[serde(default)]
    pub force_refresh: bool,
}

pub async fn validate_license_handler(
    State(state): State<AppState>,
    Json(body): Json<ValidateLicenseRequest>,
) -> Result<Json<LicenseRecord>, ApiError> {
    let record = state.license.validate(&body.license_key, body.force_refresh).await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct FeatureQuery {
    pub feature: String,
}

#[derive(Debug, Serialize)]
pub struct FeatureResponse {
    pub feature: String,
    pub enabled: bool,
}

pub async fn check_feature_handler(
    State(state): State<AppState>,
    axum::extract::Query(query): axum::extract::Query<FeatureQuery>,
) -> Json<FeatureResponse> {
    let enabled = state.license.check_feature(&query.feature).await;
    Json(FeatureResponse { feature: query.feature, enabled })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_helpers::TestDatabase;

    #[tokio::test]
    async fn status_reports_the_community_default_capacity_with_no_license_configured() {
        let db = TestDatabase::new("license_handler").await;
        let state = crate::api::test_support::test_state_with_pool(db.pool.clone()).await;
        let response = license_status_handler(State(state)).await;
        assert_eq!(response.0.max_proxies, 3);
    }

    #[tokio::test]
    async fn an_unknown_feature_is_disabled() {
        let db = TestDatabase::new("license_handler_feature").await;
        let state = crate::api::test_support::test_state_with_pool(db.pool.clone()).await;
        let response =
            check_feature_handler(State(state), axum::extract::Query(FeatureQuery { feature: "mtls".to_string() }))
                .await;
        assert!(!response.0.enabled);
    }
}

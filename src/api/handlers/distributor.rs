//! Config Distributor endpoints: cluster- and proxy-scoped config
//! snapshots, plus the long-poll used by data-plane proxies to avoid
//! busy-polling for changes.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::distributor::{ConfigSnapshot, PollOutcome};
use crate::errors::MarchProxyError;
use crate::observability::metrics;

fn cluster_api_key(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get("x-cluster-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| MarchProxyError::validation("missing X-Cluster-Api-Key header").into())
}

pub async fn get_cluster_config_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ConfigSnapshot>, ApiError> {
    let api_key = cluster_api_key(&headers)?;
    let snapshot = state.distributor.get_cluster_config(api_key).await?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct ProxyCapabilities {
    #[serde(default)]
    pub capabilities: Vec<String>,
}

pub async fn get_proxy_config_handler(
    State(state): State<AppState>,
    Path(proxy_name): Path<String>,
    headers: HeaderMap,
    Query(query): Query<ProxyCapabilities>,
) -> Result<Json<ConfigSnapshot>, ApiError> {
    let api_key = cluster_api_key(&headers)?;
    let snapshot = state.distributor.get_proxy_config(&proxy_name, api_key, &query.capabilities).await?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    pub since_version: String,
    #[serde(default = "default_max_wait_seconds")]
    pub max_wait_seconds: u64,
}

fn default_max_wait_seconds() -> u64 {
    30
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollResponse {
    Changed { snapshot: ConfigSnapshot },
    NoChange,
}

pub async fn poll_config_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PollQuery>,
) -> Result<Json<PollResponse>, ApiError> {
    let api_key = cluster_api_key(&headers)?;
    let max_wait = Duration::from_secs(query.max_wait_seconds.min(120));

    let outcome = state.distributor.poll_changes(api_key, &query.since_version, max_wait).await?;

    metrics::record_config_poll(match &outcome {
        PollOutcome::Changed(_) => "changed",
        PollOutcome::NoChange => "no_change",
    })
    .await;

    Ok(Json(match outcome {
        PollOutcome::Changed(snapshot) => PollResponse::Changed { snapshot },
        PollOutcome::NoChange => PollResponse::NoChange,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hashing::hash_cluster_api_key;
    use crate::domain::Cluster;
    use crate::storage::repositories::ClusterRepository;
    use crate::storage::test_helpers::TestDatabase;
    use axum::http::HeaderValue;

    async fn state_with_cluster() -> (AppState, String) {
        let db = TestDatabase::new("distributor_handler").await;
        let clusters = ClusterRepository::new(db.pool.clone());
        let api_key = "cluster-secret".to_string();
        let hash = hash_cluster_api_key(&api_key);
        let cluster = Cluster::new("edge", hash, 5);
        clusters.create(&cluster).await.unwrap();
        let state = crate::api::test_support::test_state_with_pool(db.pool.clone()).await;
        (state, api_key)
    }

    fn headers_with_key(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-cluster-api-key", HeaderValue::from_str(key).unwrap());
        headers
    }

    #[tokio::test]
    async fn cluster_config_rejects_a_bad_api_key() {
        let (state, _) = state_with_cluster().await;
        let result = get_cluster_config_handler(State(state), headers_with_key("nope")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cluster_config_succeeds_for_a_valid_key() {
        let (state, api_key) = state_with_cluster().await;
        let result = get_cluster_config_handler(State(state), headers_with_key(&api_key)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn poll_with_no_changes_returns_no_change_quickly() {
        let (state, api_key) = state_with_cluster().await;
        let snapshot = get_cluster_config_handler(State(state.clone()), headers_with_key(&api_key)).await.unwrap();
        let response = poll_config_handler(
            State(state),
            headers_with_key(&api_key),
            Query(PollQuery { since_version: snapshot.0.version.clone(), max_wait_seconds: 1 }),
        )
        .await
        .unwrap();
        matches!(response.0, PollResponse::NoChange);
    }
}

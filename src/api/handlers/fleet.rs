//! Fleet Registrar endpoints: proxy registration, heartbeats, and the
//! per-cluster proxy listing. Authenticated with a cluster API key carried
//! in the `X-Cluster-Api-Key` header rather than an operator session token
//! -- proxies never hold an operator's credentials.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::domain::{ClusterId, ProxyStatus};
use crate::errors::MarchProxyError;
use crate::observability::metrics;
use crate::registrar::{HeartbeatMetrics, ProxyFilter};

fn cluster_api_key(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get("x-cluster-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| MarchProxyError::validation("missing X-Cluster-Api-Key header").into())
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub hostname: String,
    pub address: String,
    pub port: i32,
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub proxy_id: String,
    pub cluster_id: String,
    pub status: String,
}

pub async fn register_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let api_key = cluster_api_key(&headers)?;
    let license_max_proxies = state.license.capacity().await;

    let outcome = state
        .registrar
        .register(
            api_key,
            &body.name,
            &body.hostname,
            &body.address,
            body.port,
            &body.version,
            body.capabilities,
            license_max_proxies,
        )
        .await;

    metrics::record_proxy_registration(
        outcome.as_ref().map(|o| o.cluster_id.as_str()).unwrap_or("unknown"),
        if outcome.is_ok() { "registered" } else { "rejected" },
    )
    .await;

    let outcome = outcome?;
    Ok(Json(RegisterResponse {
        proxy_id: outcome.proxy_id.into_string(),
        cluster_id: outcome.cluster_id.into_string(),
        status: outcome.status.as_str().to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub proxy_name: String,
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub config_version: Option<String>,
    #[serde(default)]
    pub metrics: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub acknowledged: bool,
    pub next_interval_seconds: i64,
}

pub async fn heartbeat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let api_key = cluster_api_key(&headers)?;
    let metrics = body.metrics.map(|fields| HeartbeatMetrics { fields });

    let outcome = state
        .registrar
        .heartbeat(api_key, &body.proxy_name, &body.version, body.capabilities, body.config_version, metrics)
        .await?;

    Ok(Json(HeartbeatResponse {
        acknowledged: outcome.acknowledged,
        next_interval_seconds: outcome.next_interval_seconds,
    }))
}

#[derive(Debug, Serialize)]
pub struct ProxySummary {
    pub id: String,
    pub name: String,
    pub hostname: String,
    pub address: String,
    pub port: i32,
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListProxiesQuery {
    pub status: Option<String>,
}

pub async fn list_proxies_handler(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
    Query(query): Query<ListProxiesQuery>,
) -> Result<Json<Vec<ProxySummary>>, ApiError> {
    let status = match query.status.as_deref() {
        Some("active") => Some(ProxyStatus::Active),
        Some("stale") => Some(ProxyStatus::Stale),
        Some("retired") => Some(ProxyStatus::Retired),
        Some("registering") => Some(ProxyStatus::Registering),
        Some(other) => return Err(MarchProxyError::validation(format!("unknown proxy status '{other}'")).into()),
        None => None,
    };

    let proxies = state
        .registrar
        .list_proxies(&ClusterId::from_string(cluster_id), ProxyFilter { status })
        .await?;

    Ok(Json(
        proxies
            .into_iter()
            .map(|p| ProxySummary {
                id: p.id.into_string(),
                name: p.name,
                hostname: p.hostname,
                address: p.address,
                port: p.port,
                status: p.status.as_str().to_string(),
                version: p.version,
            })
            .collect(),
    ))
}

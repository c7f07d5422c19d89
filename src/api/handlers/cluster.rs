//! Operator-session cluster management: creating clusters and rotating
//! their API keys. The raw API key is only ever returned once, in the
//! response to the call that generated it.

use axum::extract::{Path, State};
use axum::Json;
use base64::Engine;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::auth::hashing::hash_cluster_api_key;
use crate::domain::{Cluster, ClusterId};
use crate::storage::repositories::AuditEvent;

fn generate_api_key() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug, Serialize)]
pub struct ClusterResponse {
    pub id: String,
    pub name: String,
    pub max_proxies: i64,
    pub is_default: bool,
    pub active: bool,
}

impl From<Cluster> for ClusterResponse {
    fn from(c: Cluster) -> Self {
        Self { id: c.id.into_string(), name: c.name, max_proxies: c.max_proxies, is_default: c.is_default, active: c.active }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateClusterRequest {
    pub name: String,
    pub max_proxies: i64,
}

#[derive(Debug, Serialize)]
pub struct CreateClusterResponse {
    pub cluster: ClusterResponse,
    pub api_key: String,
}

pub async fn create_cluster_handler(
    State(state): State<AppState>,
    Json(body): Json<CreateClusterRequest>,
) -> Result<Json<CreateClusterResponse>, ApiError> {
    let api_key = generate_api_key();
    let api_key_hash = hash_cluster_api_key(&api_key);
    let cluster = Cluster::new(&body.name, api_key_hash, body.max_proxies);
    state.clusters.create(&cluster).await?;

    state
        .audit
        .record(AuditEvent::new("cluster.created", "operator", "cluster", cluster.id.as_str()))
        .await?;

    Ok(Json(CreateClusterResponse { cluster: cluster.into(), api_key }))
}

#[derive(Debug, Serialize)]
pub struct RotateApiKeyResponse {
    pub api_key: String,
}

pub async fn rotate_api_key_handler(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
) -> Result<Json<RotateApiKeyResponse>, ApiError> {
    let cluster_id = ClusterId::from_string(cluster_id);
    let api_key = generate_api_key();
    let api_key_hash = hash_cluster_api_key(&api_key);
    state.clusters.rotate_api_key(&cluster_id, &api_key_hash).await?;

    state
        .audit
        .record(AuditEvent::new("cluster.key_rotated", "operator", "cluster", cluster_id.as_str()))
        .await?;

    Ok(Json(RotateApiKeyResponse { api_key }))
}

pub async fn list_clusters_handler(State(state): State<AppState>) -> Result<Json<Vec<ClusterResponse>>, ApiError> {
    let clusters = state.clusters.list_active().await?;
    Ok(Json(clusters.into_iter().map(Into::into).collect()))
}

//! Operator-session audit log endpoints: list recent events across the
//! store, or scoped to a single target (e.g. a cluster or proxy id).

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::storage::repositories::AuditRecord;

#[derive(Debug, Deserialize)]
pub struct ListRecentQuery {
    pub limit: Option<i64>,
}

pub async fn list_recent_handler(
    State(state): State<AppState>,
    Query(query): Query<ListRecentQuery>,
) -> Result<Json<Vec<AuditRecord>>, ApiError> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let entries = state.audit.list_recent(limit).await?;
    Ok(Json(entries))
}

pub async fn list_for_target_handler(
    State(state): State<AppState>,
    Path((target_type, target_id)): Path<(String, String)>,
) -> Result<Json<Vec<AuditRecord>>, ApiError> {
    let entries = state.audit.list_for_target(&target_type, &target_id).await?;
    Ok(Json(entries))
}

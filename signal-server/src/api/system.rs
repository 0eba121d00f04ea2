//! System control and health endpoints

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::{ApiResult, AppState, AuthUser};
use crate::models::AuditEvent;
use crate::pipeline::PipelineStatus;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy", "timestamp": Utc::now().to_rfc3339()}))
}

pub async fn start(
    AuthUser(_user_id): AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<PipelineStatus>> {
    let status = state.pipeline.start().await?;
    tracing::info!("Pipeline started via API");
    Ok(Json(status))
}

pub async fn stop(
    AuthUser(_user_id): AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<PipelineStatus>> {
    let status = state.pipeline.stop().await;
    tracing::info!("Pipeline stopped via API");
    Ok(Json(status))
}

pub async fn status(
    AuthUser(_user_id): AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<PipelineStatus>> {
    Ok(Json(state.pipeline.status().await))
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_audit_limit")]
    pub limit: i64,
}

fn default_audit_limit() -> i64 {
    100
}

pub async fn audit(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditEvent>>> {
    Ok(Json(
        state
            .db
            .list_audit_events(user_id, query.limit.clamp(1, 1000))
            .await?,
    ))
}

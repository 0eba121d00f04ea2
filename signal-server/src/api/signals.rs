//! Signal read endpoints

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiResult, AppState, AuthUser};
use crate::error::DomainError;
use crate::models::Signal;

#[derive(Debug, Deserialize)]
pub struct Paging {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Query(paging): Query<Paging>,
) -> ApiResult<Json<Vec<Signal>>> {
    Ok(Json(
        state
            .db
            .list_signals(user_id, paging.limit.clamp(1, 500), paging.offset.max(0))
            .await?,
    ))
}

pub async fn get_one(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Signal>> {
    let signal = state
        .db
        .get_signal(id)
        .await?
        .filter(|s| s.user_id == user_id)
        .ok_or(DomainError::NotFound("signal"))?;

    Ok(Json(signal))
}

//! Channel subscription endpoints

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{ApiResult, AppState, AuthUser};
use crate::error::DomainError;
use crate::models::ChannelSubscription;

#[derive(Debug, Deserialize)]
pub struct CreateChannel {
    pub external_id: i64,
    pub label: String,
}

pub async fn list(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ChannelSubscription>>> {
    Ok(Json(state.db.list_channels(user_id).await?))
}

pub async fn create(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Json(request): Json<CreateChannel>,
) -> ApiResult<Json<ChannelSubscription>> {
    let channel = state
        .db
        .create_channel(user_id, request.external_id, &request.label)
        .await?;

    state
        .db
        .record_audit(
            user_id,
            "channel_subscribed",
            "channel",
            Some(channel.id),
            json!({"external_id": channel.external_id, "label": channel.label}),
            None,
        )
        .await?;

    Ok(Json(channel))
}

pub async fn delete(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.db.delete_channel(user_id, id).await? {
        return Err(DomainError::NotFound("channel subscription").into());
    }

    state
        .db
        .record_audit(user_id, "channel_removed", "channel", Some(id), json!({}), None)
        .await?;

    Ok(Json(json!({"deleted": true})))
}

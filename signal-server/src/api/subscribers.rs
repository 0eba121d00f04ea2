//! Subscriber (forward target) endpoints

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{ApiResult, AppState, AuthUser};
use crate::error::DomainError;
use crate::models::Subscriber;

#[derive(Debug, Deserialize)]
pub struct CreateSubscriber {
    pub address: String,
    pub label: String,
}

pub async fn list(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Subscriber>>> {
    Ok(Json(state.db.list_subscribers(user_id).await?))
}

pub async fn create(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Json(request): Json<CreateSubscriber>,
) -> ApiResult<Json<Subscriber>> {
    let subscriber = state
        .db
        .create_subscriber(user_id, &request.address, &request.label)
        .await?;

    state
        .db
        .record_audit(
            user_id,
            "subscriber_added",
            "subscriber",
            Some(subscriber.id),
            json!({"label": subscriber.label}),
            None,
        )
        .await?;

    Ok(Json(subscriber))
}

pub async fn delete(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.db.delete_subscriber(user_id, id).await? {
        return Err(DomainError::NotFound("subscriber").into());
    }

    state
        .db
        .record_audit(
            user_id,
            "subscriber_removed",
            "subscriber",
            Some(id),
            json!({}),
            None,
        )
        .await?;

    Ok(Json(json!({"deleted": true})))
}

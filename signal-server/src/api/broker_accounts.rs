//! Broker account configuration endpoints

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{ApiResult, AppState, AuthUser};
use crate::error::DomainError;
use crate::models::BrokerAccount;

#[derive(Debug, Deserialize)]
pub struct CreateBrokerAccount {
    pub label: String,
    pub login: i64,
    pub server: String,
}

pub async fn list(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<BrokerAccount>>> {
    Ok(Json(state.db.list_broker_accounts(user_id).await?))
}

pub async fn create(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Json(request): Json<CreateBrokerAccount>,
) -> ApiResult<Json<BrokerAccount>> {
    let account = state
        .db
        .create_broker_account(user_id, &request.label, request.login, &request.server)
        .await?;

    state
        .db
        .record_audit(
            user_id,
            "broker_config_created",
            "broker_account",
            Some(account.id),
            json!({"label": account.label, "server": account.server}),
            None,
        )
        .await?;

    Ok(Json(account))
}

pub async fn delete(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.db.delete_broker_account(user_id, id).await? {
        return Err(DomainError::NotFound("broker account").into());
    }

    state
        .db
        .record_audit(
            user_id,
            "broker_config_deleted",
            "broker_account",
            Some(id),
            json!({}),
            None,
        )
        .await?;

    Ok(Json(json!({"deleted": true})))
}

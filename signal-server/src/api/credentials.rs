//! Credential endpoints. Values are encrypted by the vault before they
//! reach the database and are never returned.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{ApiResult, AppState, AuthUser};
use crate::error::DomainError;

#[derive(Debug, Deserialize)]
pub struct StoreCredential {
    pub broker_config_id: Option<Uuid>,
    pub credential_type: String,
    pub value: String,
}

pub async fn store(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Json(request): Json<StoreCredential>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(broker_id) = request.broker_config_id {
        let account = state
            .db
            .get_broker_account(broker_id)
            .await?
            .filter(|a| a.user_id == user_id);
        if account.is_none() {
            return Err(DomainError::NotFound("broker account").into());
        }
    }

    let id = state
        .vault
        .store(
            &state.db,
            user_id,
            request.broker_config_id,
            &request.credential_type,
            &request.value,
        )
        .await?;

    state
        .db
        .record_audit(
            user_id,
            "credential_stored",
            "credential",
            Some(id),
            json!({"credential_type": request.credential_type}),
            None,
        )
        .await?;

    Ok(Json(json!({"id": id})))
}

pub async fn delete(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.db.delete_credential(user_id, id).await? {
        return Err(DomainError::NotFound("credential").into());
    }

    state
        .db
        .record_audit(
            user_id,
            "credential_deleted",
            "credential",
            Some(id),
            json!({}),
            None,
        )
        .await?;

    Ok(Json(json!({"deleted": true})))
}

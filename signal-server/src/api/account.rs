//! Broker account information endpoint

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiResult, AppState, AuthUser};
use crate::broker::AccountInfo;
use crate::error::DomainError;
use crate::models::CREDENTIAL_TYPE_BROKER_PASSWORD;

#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    pub broker_config_id: Uuid,
}

pub async fn info(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<AccountQuery>,
) -> ApiResult<Json<AccountInfo>> {
    let account = state
        .db
        .get_broker_account(query.broker_config_id)
        .await?
        .filter(|a| a.user_id == user_id)
        .ok_or(DomainError::NotFound("broker account"))?;

    let credentials = state
        .vault
        .broker_credentials(&state.db, user_id, account.id)
        .await?;
    let password = credentials
        .get(CREDENTIAL_TYPE_BROKER_PASSWORD)
        .ok_or_else(|| DomainError::Validation("broker password not configured".into()))?;

    let session = state
        .gateway
        .session(account.login, password, &account.server)
        .await?;

    Ok(Json(session.account_info().await?))
}

//! Execution endpoints: invoke the engine, inspect results, and drive
//! the approval path.

use axum::extract::{Path, Query, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::signals::Paging;
use super::{ApiResult, AppState, AuthUser};
use crate::engine::{ExecutionOutcome, ExecutionResult};
use crate::error::DomainError;
use crate::models::Execution;

#[derive(Debug, Deserialize)]
pub struct CreateExecution {
    pub signal_id: Uuid,
    pub broker_config_id: Uuid,
}

#[derive(Debug, Deserialize, Default)]
pub struct LevelOverrides {
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

async fn owned_execution(
    state: &AppState,
    user_id: Uuid,
    execution_id: Uuid,
) -> Result<Execution, DomainError> {
    state
        .db
        .get_execution(execution_id)
        .await?
        .filter(|e| e.user_id == user_id)
        .ok_or(DomainError::NotFound("execution"))
}

pub async fn create(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Json(request): Json<CreateExecution>,
) -> ApiResult<Json<ExecutionOutcome>> {
    let signal = state
        .db
        .get_signal(request.signal_id)
        .await?
        .filter(|s| s.user_id == user_id)
        .ok_or(DomainError::NotFound("signal"))?;

    let broker = state
        .db
        .get_broker_account(request.broker_config_id)
        .await?
        .filter(|b| b.user_id == user_id)
        .ok_or(DomainError::NotFound("broker account"))?;

    let outcome = state.engine.execute_signal(&signal, broker.id).await?;

    state
        .db
        .record_audit(
            user_id,
            "execution_requested",
            "signal",
            Some(signal.id),
            json!({"broker_config_id": broker.id}),
            None,
        )
        .await?;

    Ok(Json(outcome))
}

pub async fn list(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Query(paging): Query<Paging>,
) -> ApiResult<Json<Vec<Execution>>> {
    Ok(Json(
        state
            .db
            .list_executions(user_id, paging.limit.clamp(1, 500), paging.offset.max(0))
            .await?,
    ))
}

pub async fn get_one(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Execution>> {
    Ok(Json(owned_execution(&state, user_id, id).await?))
}

pub async fn confirm(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(overrides): Json<LevelOverrides>,
) -> ApiResult<Json<ExecutionResult>> {
    owned_execution(&state, user_id, id).await?;

    let result = state
        .engine
        .confirm(id, overrides.stop_loss, overrides.take_profit)
        .await?;

    state
        .db
        .record_audit(
            user_id,
            "execution_confirmed",
            "execution",
            Some(id),
            json!({"success": result.success}),
            None,
        )
        .await?;

    Ok(Json(result))
}

pub async fn cancel(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    owned_execution(&state, user_id, id).await?;

    state.engine.cancel(id).await?;

    state
        .db
        .record_audit(
            user_id,
            "execution_cancelled",
            "execution",
            Some(id),
            json!({}),
            None,
        )
        .await?;

    Ok(Json(json!({"success": true})))
}

pub async fn close(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Execution>> {
    owned_execution(&state, user_id, id).await?;

    let execution = state.engine.close(id).await?;

    state
        .db
        .record_audit(
            user_id,
            "position_closed",
            "execution",
            Some(id),
            json!({"profit_loss": execution.profit_loss}),
            None,
        )
        .await?;

    Ok(Json(execution))
}

pub async fn modify(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(overrides): Json<LevelOverrides>,
) -> ApiResult<Json<Execution>> {
    owned_execution(&state, user_id, id).await?;

    let execution = state
        .engine
        .modify(id, overrides.stop_loss, overrides.take_profit)
        .await?;

    state
        .db
        .record_audit(
            user_id,
            "position_modified",
            "execution",
            Some(id),
            json!({"stop_loss": overrides.stop_loss, "take_profit": overrides.take_profit}),
            None,
        )
        .await?;

    Ok(Json(execution))
}

//! User preference endpoints

use axum::extract::State;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use super::{ApiResult, AppState, AuthUser};
use crate::models::Preferences;

#[derive(Debug, Deserialize)]
pub struct UpdateSettings {
    pub manual_approval: Option<bool>,
    pub risk_per_trade: Option<Decimal>,
    pub max_slippage_pips: Option<Decimal>,
    pub use_limit_orders: Option<bool>,
    pub default_sl_pips: Option<i64>,
    pub max_open_positions: Option<i64>,
}

pub async fn get_settings(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Preferences>> {
    Ok(Json(state.db.get_preferences(user_id).await?))
}

pub async fn put_settings(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Json(update): Json<UpdateSettings>,
) -> ApiResult<Json<Preferences>> {
    let mut prefs = state.db.get_preferences(user_id).await?;

    if let Some(manual_approval) = update.manual_approval {
        prefs.manual_approval = manual_approval;
    }
    if let Some(risk_per_trade) = update.risk_per_trade {
        prefs.risk_per_trade = risk_per_trade;
    }
    if let Some(max_slippage_pips) = update.max_slippage_pips {
        prefs.max_slippage_pips = max_slippage_pips;
    }
    if let Some(use_limit_orders) = update.use_limit_orders {
        prefs.use_limit_orders = use_limit_orders;
    }
    if let Some(default_sl_pips) = update.default_sl_pips {
        prefs.default_sl_pips = default_sl_pips;
    }
    if let Some(max_open_positions) = update.max_open_positions {
        prefs.max_open_positions = max_open_positions;
    }

    state.db.save_preferences(&prefs).await?;

    state
        .db
        .record_audit(
            user_id,
            "settings_updated",
            "preferences",
            None,
            json!({"manual_approval": prefs.manual_approval}),
            None,
        )
        .await?;

    Ok(Json(prefs))
}

//! User preference storage. Defaults are materialized on first read.

use anyhow::Result;
use sqlx::Row;
use uuid::Uuid;

use super::{parse_decimal, Database};
use crate::models::Preferences;

fn row_to_preferences(row: &sqlx::sqlite::SqliteRow, user_id: Uuid) -> Result<Preferences> {
    Ok(Preferences {
        user_id,
        manual_approval: row.get::<i64, _>("manual_approval") != 0,
        risk_per_trade: parse_decimal(&row.get::<String, _>("risk_per_trade"))?,
        max_slippage_pips: parse_decimal(&row.get::<String, _>("max_slippage_pips"))?,
        use_limit_orders: row.get::<i64, _>("use_limit_orders") != 0,
        default_sl_pips: row.get("default_sl_pips"),
        max_open_positions: row.get("max_open_positions"),
    })
}

impl Database {
    pub async fn get_preferences(&self, user_id: Uuid) -> Result<Preferences> {
        let row = sqlx::query("SELECT * FROM preferences WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            return row_to_preferences(&row, user_id);
        }

        let defaults = Preferences::defaults_for(user_id);
        self.save_preferences(&defaults).await?;
        Ok(defaults)
    }

    pub async fn save_preferences(&self, prefs: &Preferences) -> Result<()> {
        sqlx::query(
            "INSERT INTO preferences
             (user_id, manual_approval, risk_per_trade, max_slippage_pips,
              use_limit_orders, default_sl_pips, max_open_positions)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                manual_approval = excluded.manual_approval,
                risk_per_trade = excluded.risk_per_trade,
                max_slippage_pips = excluded.max_slippage_pips,
                use_limit_orders = excluded.use_limit_orders,
                default_sl_pips = excluded.default_sl_pips,
                max_open_positions = excluded.max_open_positions",
        )
        .bind(prefs.user_id.to_string())
        .bind(prefs.manual_approval as i64)
        .bind(prefs.risk_per_trade.to_string())
        .bind(prefs.max_slippage_pips.to_string())
        .bind(prefs.use_limit_orders as i64)
        .bind(prefs.default_sl_pips)
        .bind(prefs.max_open_positions)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

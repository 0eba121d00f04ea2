//! Execution persistence.
//!
//! State changes go through compare-and-swap updates keyed on the
//! current state, which gives each execution a strictly linear history
//! even when the engine and synchronizer race.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use uuid::Uuid;

use super::{
    parse_decimal, parse_decimal_opt, parse_timestamp, parse_timestamp_opt, parse_uuid,
    to_opt_string, Database,
};
use crate::models::{Execution, ExecutionState, Side};

fn row_to_execution(row: &sqlx::sqlite::SqliteRow) -> Result<Execution> {
    let side = Side::parse(&row.get::<String, _>("side"))
        .ok_or_else(|| anyhow::anyhow!("unknown side"))?;
    let state = ExecutionState::parse(&row.get::<String, _>("state"))
        .ok_or_else(|| anyhow::anyhow!("unknown execution state"))?;

    Ok(Execution {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
        signal_id: parse_uuid(&row.get::<String, _>("signal_id"))?,
        broker_account_id: parse_uuid(&row.get::<String, _>("broker_account_id"))?,
        symbol: row.get("symbol"),
        side,
        volume: parse_decimal(&row.get::<String, _>("volume"))?,
        entry_price: parse_decimal_opt(row.get("entry_price"))?,
        stop_loss: parse_decimal_opt(row.get("stop_loss"))?,
        take_profit: parse_decimal_opt(row.get("take_profit"))?,
        state,
        ticket: row.get("ticket"),
        actual_entry_price: parse_decimal_opt(row.get("actual_entry_price"))?,
        executed_at: parse_timestamp_opt(row.get("executed_at"))?,
        close_price: parse_decimal_opt(row.get("close_price"))?,
        close_time: parse_timestamp_opt(row.get("close_time"))?,
        profit_loss: parse_decimal_opt(row.get("profit_loss"))?,
        error: row.get("error"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

impl Database {
    pub async fn insert_execution(&self, execution: &Execution) -> Result<()> {
        sqlx::query(
            "INSERT INTO executions
             (id, user_id, signal_id, broker_account_id, symbol, side, volume,
              entry_price, stop_loss, take_profit, state, ticket, actual_entry_price,
              executed_at, close_price, close_time, profit_loss, error, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(execution.id.to_string())
        .bind(execution.user_id.to_string())
        .bind(execution.signal_id.to_string())
        .bind(execution.broker_account_id.to_string())
        .bind(&execution.symbol)
        .bind(execution.side.as_str())
        .bind(execution.volume.to_string())
        .bind(to_opt_string(&execution.entry_price))
        .bind(to_opt_string(&execution.stop_loss))
        .bind(to_opt_string(&execution.take_profit))
        .bind(execution.state.as_str())
        .bind(execution.ticket)
        .bind(to_opt_string(&execution.actual_entry_price))
        .bind(execution.executed_at.map(|t| t.to_rfc3339()))
        .bind(to_opt_string(&execution.close_price))
        .bind(execution.close_time.map(|t| t.to_rfc3339()))
        .bind(to_opt_string(&execution.profit_loss))
        .bind(&execution.error)
        .bind(execution.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_execution(&self, id: Uuid) -> Result<Option<Execution>> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_execution).transpose()
    }

    pub async fn list_executions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Execution>> {
        let rows = sqlx::query(
            "SELECT * FROM executions WHERE user_id = ?
             ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(user_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_execution).collect()
    }

    pub async fn executions_for_signal(&self, signal_id: Uuid) -> Result<Vec<Execution>> {
        let rows = sqlx::query(
            "SELECT * FROM executions WHERE signal_id = ? ORDER BY created_at ASC",
        )
        .bind(signal_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_execution).collect()
    }

    pub async fn executions_in_state(&self, state: ExecutionState) -> Result<Vec<Execution>> {
        let rows = sqlx::query("SELECT * FROM executions WHERE state = ?")
            .bind(state.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_execution).collect()
    }

    /// Compare-and-swap state transition. Returns false when the row
    /// was not in `from` anymore.
    pub async fn transition_execution(
        &self,
        id: Uuid,
        from: ExecutionState,
        to: ExecutionState,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE executions SET state = ? WHERE id = ? AND state = ?")
            .bind(to.as_str())
            .bind(id.to_string())
            .bind(from.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn fail_execution(&self, id: Uuid, from: ExecutionState, error: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE executions SET state = 'failed', error = ? WHERE id = ? AND state = ?",
        )
        .bind(error)
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_execution_executed(
        &self,
        id: Uuid,
        ticket: i64,
        actual_entry_price: Decimal,
        executed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE executions
             SET state = 'executed', ticket = ?, actual_entry_price = ?, executed_at = ?, error = NULL
             WHERE id = ? AND state = 'executing'",
        )
        .bind(ticket)
        .bind(actual_entry_price.to_string())
        .bind(executed_at.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Close bookkeeping; only an EXECUTED position can close.
    pub async fn mark_execution_closed(
        &self,
        id: Uuid,
        close_price: Decimal,
        profit_loss: Option<Decimal>,
        close_time: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE executions
             SET state = 'closed', close_price = ?, profit_loss = ?, close_time = ?
             WHERE id = ? AND state = 'executed'",
        )
        .bind(close_price.to_string())
        .bind(to_opt_string(&profit_loss))
        .bind(close_time.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Live P&L refresh from the synchronizer; never touches state.
    pub async fn update_execution_profit(&self, id: Uuid, profit_loss: Decimal) -> Result<()> {
        sqlx::query("UPDATE executions SET profit_loss = ? WHERE id = ? AND state = 'executed'")
            .bind(profit_loss.to_string())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Apply confirm-time SL/TP overrides.
    pub async fn update_execution_levels(
        &self,
        id: Uuid,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<()> {
        if stop_loss.is_none() && take_profit.is_none() {
            return Ok(());
        }

        if let Some(sl) = stop_loss {
            sqlx::query("UPDATE executions SET stop_loss = ? WHERE id = ?")
                .bind(sl.to_string())
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
        }
        if let Some(tp) = take_profit {
            sqlx::query("UPDATE executions SET take_profit = ? WHERE id = ?")
                .bind(tp.to_string())
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}

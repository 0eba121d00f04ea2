//! Signal persistence.
//!
//! Recording a signal and its audit entry is one transaction. Status
//! recomputation runs under the writer lock with a pending-only guard,
//! which keeps the pending -> processed | rejected progression monotone
//! even under concurrent execution completions.

use anyhow::Result;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::{parse_timestamp, parse_timestamp_opt, parse_uuid, Database};
use crate::models::{
    ExecutionState, Extraction, MessageCategory, ModificationType, Signal, SignalStatus,
};

fn row_to_signal(row: &sqlx::sqlite::SqliteRow) -> Result<Signal> {
    let extracted: Extraction = serde_json::from_str(&row.get::<String, _>("extracted"))?;
    let category = MessageCategory::parse(&row.get::<String, _>("category"))
        .ok_or_else(|| anyhow::anyhow!("unknown message category"))?;
    let modification_type = row
        .get::<Option<String>, _>("modification_type")
        .as_deref()
        .and_then(ModificationType::parse);
    let status = SignalStatus::parse(&row.get::<String, _>("status"))
        .ok_or_else(|| anyhow::anyhow!("unknown signal status"))?;

    Ok(Signal {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
        channel_id: parse_uuid(&row.get::<String, _>("channel_id"))?,
        raw_text: row.get("raw_text"),
        extracted,
        category,
        modification_type,
        actionable: row.get::<i64, _>("actionable") != 0,
        status,
        received_at: parse_timestamp(&row.get::<String, _>("received_at"))?,
        processed_at: parse_timestamp_opt(row.get("processed_at"))?,
    })
}

impl Database {
    /// Persist a signal together with its audit entry in a single
    /// transaction; the caller must not emit the signal downstream if
    /// this fails.
    pub async fn record_signal(
        &self,
        signal: &Signal,
        audit_action: &str,
        audit_details: serde_json::Value,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO signals
             (id, user_id, channel_id, raw_text, extracted, category, modification_type,
              actionable, status, received_at, processed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(signal.id.to_string())
        .bind(signal.user_id.to_string())
        .bind(signal.channel_id.to_string())
        .bind(&signal.raw_text)
        .bind(serde_json::to_string(&signal.extracted)?)
        .bind(signal.category.as_str())
        .bind(signal.modification_type.map(|m| m.as_str()))
        .bind(signal.actionable as i64)
        .bind(signal.status.as_str())
        .bind(signal.received_at.to_rfc3339())
        .bind(signal.processed_at.map(|t| t.to_rfc3339()))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO audit_events
             (id, user_id, action, resource_type, resource_id, details, client_address, created_at)
             VALUES (?, ?, ?, 'signal', ?, ?, NULL, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(signal.user_id.to_string())
        .bind(audit_action)
        .bind(signal.id.to_string())
        .bind(audit_details.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_signal(&self, id: Uuid) -> Result<Option<Signal>> {
        let row = sqlx::query("SELECT * FROM signals WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_signal).transpose()
    }

    pub async fn list_signals(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Signal>> {
        let rows = sqlx::query(
            "SELECT * FROM signals WHERE user_id = ?
             ORDER BY received_at DESC LIMIT ? OFFSET ?",
        )
        .bind(user_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_signal).collect()
    }

    /// Re-evaluate the signal's status from its executions.
    ///
    /// Returns the new status when the signal just moved out of
    /// pending, None otherwise. The UPDATE carries a pending-only guard
    /// so concurrent recomputations settle exactly once.
    pub async fn refresh_signal_status(&self, signal_id: Uuid) -> Result<Option<SignalStatus>> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query("SELECT status FROM signals WHERE id = ?")
            .bind(signal_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = current else {
            return Ok(None);
        };
        if SignalStatus::parse(&row.get::<String, _>("status")) != Some(SignalStatus::Pending) {
            return Ok(None);
        }

        let state_rows = sqlx::query("SELECT state FROM executions WHERE signal_id = ?")
            .bind(signal_id.to_string())
            .fetch_all(&mut *tx)
            .await?;

        if state_rows.is_empty() {
            return Ok(None);
        }

        let states: Vec<ExecutionState> = state_rows
            .iter()
            .filter_map(|r| ExecutionState::parse(&r.get::<String, _>("state")))
            .collect();

        if states.len() != state_rows.len() || !states.iter().all(|s| s.is_resolved()) {
            return Ok(None);
        }

        // rejected iff every execution was cancelled; processed iff all
        // resolved and at least one filled. A fully failed signal keeps
        // its pending status.
        let new_status = if states.iter().all(|s| *s == ExecutionState::Cancelled) {
            SignalStatus::Rejected
        } else if states
            .iter()
            .any(|s| matches!(s, ExecutionState::Executed | ExecutionState::Closed))
        {
            SignalStatus::Processed
        } else {
            return Ok(None);
        };

        let result = sqlx::query(
            "UPDATE signals SET status = ?, processed_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(new_status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(signal_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if result.rows_affected() > 0 {
            Ok(Some(new_status))
        } else {
            Ok(None)
        }
    }
}

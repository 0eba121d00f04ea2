//! ChannelSubscription CRUD operations

use anyhow::Result;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid, Database};
use crate::models::ChannelSubscription;

fn row_to_channel(row: &sqlx::sqlite::SqliteRow) -> Result<ChannelSubscription> {
    Ok(ChannelSubscription {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
        external_id: row.get("external_id"),
        label: row.get("label"),
        is_active: row.get::<i64, _>("is_active") != 0,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

impl Database {
    pub async fn create_channel(
        &self,
        user_id: Uuid,
        external_id: i64,
        label: &str,
    ) -> Result<ChannelSubscription> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO channel_subscriptions (id, user_id, external_id, label, is_active, created_at)
             VALUES (?, ?, ?, ?, 1, ?)",
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(external_id)
        .bind(label)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(ChannelSubscription {
            id,
            user_id,
            external_id,
            label: label.to_string(),
            is_active: true,
            created_at: now,
        })
    }

    pub async fn list_channels(&self, user_id: Uuid) -> Result<Vec<ChannelSubscription>> {
        let rows = sqlx::query(
            "SELECT * FROM channel_subscriptions WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_channel).collect()
    }

    /// Every active subscription across all users, used by the pipeline
    /// coordinator to register listeners at startup.
    pub async fn list_active_channels(&self) -> Result<Vec<ChannelSubscription>> {
        let rows = sqlx::query("SELECT * FROM channel_subscriptions WHERE is_active = 1")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_channel).collect()
    }

    /// Look up the subscription by (external channel id, user).
    pub async fn get_channel_by_external(
        &self,
        external_id: i64,
        user_id: Uuid,
    ) -> Result<Option<ChannelSubscription>> {
        let row = sqlx::query(
            "SELECT * FROM channel_subscriptions WHERE external_id = ? AND user_id = ?",
        )
        .bind(external_id)
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_channel).transpose()
    }

    pub async fn delete_channel(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM channel_subscriptions WHERE id = ? AND user_id = ?")
            .bind(id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

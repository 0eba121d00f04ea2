//! Subscriber CRUD operations

use anyhow::Result;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid, Database};
use crate::models::Subscriber;

fn row_to_subscriber(row: &sqlx::sqlite::SqliteRow) -> Result<Subscriber> {
    Ok(Subscriber {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
        address: row.get("address"),
        label: row.get("label"),
        is_active: row.get::<i64, _>("is_active") != 0,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

impl Database {
    pub async fn create_subscriber(
        &self,
        user_id: Uuid,
        address: &str,
        label: &str,
    ) -> Result<Subscriber> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO subscribers (id, user_id, address, label, is_active, created_at)
             VALUES (?, ?, ?, ?, 1, ?)",
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(address)
        .bind(label)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Subscriber {
            id,
            user_id,
            address: address.to_string(),
            label: label.to_string(),
            is_active: true,
            created_at: now,
        })
    }

    pub async fn list_subscribers(&self, user_id: Uuid) -> Result<Vec<Subscriber>> {
        let rows = sqlx::query(
            "SELECT * FROM subscribers WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_subscriber).collect()
    }

    pub async fn active_subscribers(&self, user_id: Uuid) -> Result<Vec<Subscriber>> {
        let rows = sqlx::query("SELECT * FROM subscribers WHERE user_id = ? AND is_active = 1")
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_subscriber).collect()
    }

    pub async fn delete_subscriber(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscribers WHERE id = ? AND user_id = ?")
            .bind(id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

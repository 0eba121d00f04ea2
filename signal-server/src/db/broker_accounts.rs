//! BrokerAccount CRUD operations

use anyhow::Result;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid, Database};
use crate::models::BrokerAccount;

fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<BrokerAccount> {
    Ok(BrokerAccount {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
        label: row.get("label"),
        login: row.get("login"),
        server: row.get("server"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

impl Database {
    pub async fn create_broker_account(
        &self,
        user_id: Uuid,
        label: &str,
        login: i64,
        server: &str,
    ) -> Result<BrokerAccount> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO broker_accounts (id, user_id, label, login, server, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(label)
        .bind(login)
        .bind(server)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(BrokerAccount {
            id,
            user_id,
            label: label.to_string(),
            login,
            server: server.to_string(),
            created_at: now,
        })
    }

    pub async fn get_broker_account(&self, id: Uuid) -> Result<Option<BrokerAccount>> {
        let row = sqlx::query("SELECT * FROM broker_accounts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    pub async fn list_broker_accounts(&self, user_id: Uuid) -> Result<Vec<BrokerAccount>> {
        let rows = sqlx::query(
            "SELECT * FROM broker_accounts WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_account).collect()
    }

    pub async fn delete_broker_account(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM broker_accounts WHERE id = ? AND user_id = ?")
            .bind(id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

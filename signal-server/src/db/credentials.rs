//! Credential storage. Values arrive already encrypted; the unique key
//! is (user, broker account, type) and writes upsert in place.

use anyhow::Result;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid, Database};
use crate::models::Credential;

fn row_to_credential(row: &sqlx::sqlite::SqliteRow) -> Result<Credential> {
    let broker: Option<String> = row.get("broker_account_id");
    Ok(Credential {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
        broker_account_id: broker.as_deref().map(parse_uuid).transpose()?,
        credential_type: row.get("credential_type"),
        encrypted_value: row.get("encrypted_value"),
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}

impl Database {
    /// Insert or update the credential stored under
    /// (user, broker account, type).
    pub async fn upsert_credential(
        &self,
        user_id: Uuid,
        broker_account_id: Option<Uuid>,
        credential_type: &str,
        encrypted_value: &str,
    ) -> Result<Uuid> {
        let now = Utc::now().to_rfc3339();
        let broker = broker_account_id.map(|id| id.to_string());

        let existing = sqlx::query(
            "SELECT id FROM credentials
             WHERE user_id = ? AND broker_account_id IS ? AND credential_type = ?",
        )
        .bind(user_id.to_string())
        .bind(&broker)
        .bind(credential_type)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            let id = parse_uuid(&row.get::<String, _>("id"))?;
            sqlx::query("UPDATE credentials SET encrypted_value = ?, updated_at = ? WHERE id = ?")
                .bind(encrypted_value)
                .bind(&now)
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
            return Ok(id);
        }

        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO credentials
             (id, user_id, broker_account_id, credential_type, encrypted_value, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(&broker)
        .bind(credential_type)
        .bind(encrypted_value)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn credentials_for_broker(
        &self,
        user_id: Uuid,
        broker_account_id: Uuid,
    ) -> Result<Vec<Credential>> {
        let rows = sqlx::query(
            "SELECT * FROM credentials WHERE user_id = ? AND broker_account_id = ?",
        )
        .bind(user_id.to_string())
        .bind(broker_account_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_credential).collect()
    }

    pub async fn list_credentials(&self, user_id: Uuid) -> Result<Vec<Credential>> {
        let rows = sqlx::query("SELECT * FROM credentials WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_credential).collect()
    }

    /// Every stored credential, used by master key rotation.
    pub async fn list_all_credentials(&self) -> Result<Vec<Credential>> {
        let rows = sqlx::query("SELECT * FROM credentials")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_credential).collect()
    }

    pub async fn update_credential_value(&self, id: Uuid, encrypted_value: &str) -> Result<()> {
        sqlx::query("UPDATE credentials SET encrypted_value = ?, updated_at = ? WHERE id = ?")
            .bind(encrypted_value)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_credential(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE id = ? AND user_id = ?")
            .bind(id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

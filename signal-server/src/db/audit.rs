//! Append-only audit trail.

use anyhow::Result;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid, Database};
use crate::models::AuditEvent;

fn row_to_audit(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent> {
    let resource: Option<String> = row.get("resource_id");
    Ok(AuditEvent {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
        action: row.get("action"),
        resource_type: row.get("resource_type"),
        resource_id: resource.as_deref().map(parse_uuid).transpose()?,
        details: serde_json::from_str(&row.get::<String, _>("details")).unwrap_or_default(),
        client_address: row.get("client_address"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

impl Database {
    pub async fn record_audit(
        &self,
        user_id: Uuid,
        action: &str,
        resource_type: &str,
        resource_id: Option<Uuid>,
        details: serde_json::Value,
        client_address: Option<&str>,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO audit_events
             (id, user_id, action, resource_type, resource_id, details, client_address, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(action)
        .bind(resource_type)
        .bind(resource_id.map(|r| r.to_string()))
        .bind(details.to_string())
        .bind(client_address)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn list_audit_events(&self, user_id: Uuid, limit: i64) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM audit_events WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_audit).collect()
    }
}

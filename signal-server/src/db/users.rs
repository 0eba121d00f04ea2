//! User CRUD operations

use anyhow::Result;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid, Database};
use crate::models::User;

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        email: row.get("email"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        is_active: row.get::<i64, _>("is_active") != 0,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

impl Database {
    pub async fn create_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<User> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO users (id, email, username, password_hash, is_active, created_at)
             VALUES (?, ?, ?, ?, 1, ?)",
        )
        .bind(id.to_string())
        .bind(email)
        .bind(username)
        .bind(password_hash)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(User {
            id,
            email: email.to_string(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            is_active: true,
            created_at: now,
        })
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    /// Existing user with the same email or username, used by the
    /// registration conflict check.
    pub async fn user_exists(&self, email: &str, username: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE email = ? OR username = ? LIMIT 1")
            .bind(email)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }
}

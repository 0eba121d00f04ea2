//! Database module - Core database initialization and table management
//!
//! Provides the main Database struct and schema creation, with CRUD
//! operations split into submodules per entity. All ids, prices, and
//! timestamps are stored as TEXT (uuid / decimal / RFC 3339) so that
//! money never round-trips through floating point.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePool;
use std::str::FromStr;
use uuid::Uuid;

mod audit;
mod broker_accounts;
mod channels;
mod credentials;
mod executions;
mod preferences;
mod signals;
mod subscribers;
mod users;

#[cfg(test)]
mod tests;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS broker_accounts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                label TEXT NOT NULL,
                login INTEGER NOT NULL,
                server TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                broker_account_id TEXT,
                credential_type TEXT NOT NULL,
                encrypted_value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, broker_account_id, credential_type),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channel_subscriptions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                external_id INTEGER NOT NULL,
                label TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                UNIQUE (user_id, external_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                raw_text TEXT NOT NULL,
                extracted TEXT NOT NULL,
                category TEXT NOT NULL,
                modification_type TEXT,
                actionable INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                received_at TEXT NOT NULL,
                processed_at TEXT,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (channel_id) REFERENCES channel_subscriptions(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                signal_id TEXT NOT NULL,
                broker_account_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                volume TEXT NOT NULL,
                entry_price TEXT,
                stop_loss TEXT,
                take_profit TEXT,
                state TEXT NOT NULL,
                ticket INTEGER,
                actual_entry_price TEXT,
                executed_at TEXT,
                close_price TEXT,
                close_time TEXT,
                profit_loss TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (signal_id) REFERENCES signals(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS preferences (
                user_id TEXT PRIMARY KEY,
                manual_approval INTEGER NOT NULL DEFAULT 1,
                risk_per_trade TEXT NOT NULL DEFAULT '1.0',
                max_slippage_pips TEXT NOT NULL DEFAULT '5',
                use_limit_orders INTEGER NOT NULL DEFAULT 1,
                default_sl_pips INTEGER NOT NULL DEFAULT 20,
                max_open_positions INTEGER NOT NULL DEFAULT 5,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscribers (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                address TEXT NOT NULL,
                label TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                action TEXT NOT NULL,
                resource_type TEXT NOT NULL,
                resource_id TEXT,
                details TEXT NOT NULL DEFAULT '{}',
                client_address TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&pool)
        .await?;

        // Indexes for the hot lookup paths
        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_signals_user ON signals(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_signals_status ON signals(status)",
            "CREATE INDEX IF NOT EXISTS idx_executions_user ON executions(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_executions_signal ON executions(signal_id)",
            "CREATE INDEX IF NOT EXISTS idx_executions_state ON executions(state)",
            "CREATE INDEX IF NOT EXISTS idx_credentials_user ON credentials(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_channels_external ON channel_subscriptions(external_id)",
            "CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_events(user_id)",
        ] {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self { pool })
    }
}

// Row parsing helpers shared by the submodules

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| anyhow!("invalid uuid '{}': {}", value, e))
}

pub(crate) fn parse_decimal(value: &str) -> Result<Decimal> {
    Decimal::from_str(value).map_err(|e| anyhow!("invalid decimal '{}': {}", value, e))
}

pub(crate) fn parse_decimal_opt(value: Option<String>) -> Result<Option<Decimal>> {
    value.as_deref().map(parse_decimal).transpose()
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow!("invalid timestamp '{}': {}", value, e))
}

pub(crate) fn parse_timestamp_opt(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

pub(crate) fn to_opt_string<T: ToString>(value: &Option<T>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

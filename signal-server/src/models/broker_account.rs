use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broker terminal account configuration.
///
/// Transport credentials are not stored here; they live in the vault
/// keyed by (user, broker account).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub label: String,
    pub login: i64,
    pub server: String,
    pub created_at: DateTime<Utc>,
}

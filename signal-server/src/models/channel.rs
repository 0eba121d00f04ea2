use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One user's subscription to a chat channel. The same external channel
/// may be subscribed by several users independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub external_id: i64,
    pub label: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// External forwarding target for reformatted signal rebroadcasts.
/// The address is explicit configuration; there is no implicit default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: Uuid,
    pub user_id: Uuid,
    pub address: String,
    pub label: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored credential. The value is always ciphertext; decryption goes
/// through the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_account_id: Option<Uuid>,
    pub credential_type: String,
    #[serde(skip_serializing)]
    pub encrypted_value: String,
    pub updated_at: DateTime<Utc>,
}

/// Well-known credential type for broker terminal passwords.
pub const CREDENTIAL_TYPE_BROKER_PASSWORD: &str = "broker_password";

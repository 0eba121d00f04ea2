//! Execution model: one concrete order attempt at a broker for one
//! take-profit target of a Signal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Side;

/// Execution lifecycle states.
///
/// Legal transitions:
/// - create -> Pending (auto path) or PendingApproval (approval path)
/// - PendingApproval -> Cancelled | Validated
/// - Pending -> Validated | Failed
/// - Validated -> Executing
/// - Executing -> Executed | Failed
/// - Executed -> Closed
/// - Failed -> Validated (explicit confirm replays from validation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Pending,
    PendingApproval,
    Validated,
    Executing,
    Executed,
    Closed,
    Failed,
    Cancelled,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Pending => "pending",
            ExecutionState::PendingApproval => "pending_approval",
            ExecutionState::Validated => "validated",
            ExecutionState::Executing => "executing",
            ExecutionState::Executed => "executed",
            ExecutionState::Closed => "closed",
            ExecutionState::Failed => "failed",
            ExecutionState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExecutionState::Pending),
            "pending_approval" => Some(ExecutionState::PendingApproval),
            "validated" => Some(ExecutionState::Validated),
            "executing" => Some(ExecutionState::Executing),
            "executed" => Some(ExecutionState::Executed),
            "closed" => Some(ExecutionState::Closed),
            "failed" => Some(ExecutionState::Failed),
            "cancelled" => Some(ExecutionState::Cancelled),
            _ => None,
        }
    }

    /// Resolved states that count toward the parent Signal's status.
    /// Executed counts as resolved even though Closed may still follow.
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            ExecutionState::Executed
                | ExecutionState::Closed
                | ExecutionState::Failed
                | ExecutionState::Cancelled
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Closed | ExecutionState::Failed | ExecutionState::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Pending, Validated)
                | (Pending, Failed)
                | (PendingApproval, Validated)
                | (PendingApproval, Cancelled)
                | (Validated, Executing)
                | (Executing, Executed)
                | (Executing, Failed)
                | (Executed, Closed)
                | (Failed, Validated)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub user_id: Uuid,
    pub signal_id: Uuid,
    pub broker_account_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub volume: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    pub state: ExecutionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_entry_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_loss: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

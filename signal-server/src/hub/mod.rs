//! Notification hub: process-wide fan-out registry pushing structured
//! events to connected UI sessions.
//!
//! Sessions are keyed by user. Delivery is at-most-once per session;
//! a send failure drops the session. Broadcasts to different users do
//! not synchronize; each session drains its own queue serially.

mod forwarder;
mod log_layer;

pub use forwarder::SignalForwarder;
pub use log_layer::HubLogLayer;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::{MessageCategory, Side, Signal, SignalStatus};

/// Execution progress markers pushed to UIs. `falling_back` is a
/// transient marker emitted between the failed market attempt and the
/// limit retry; it is not a persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Executing,
    FallingBack,
    Executed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSummary {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    pub status: SignalStatus,
}

impl From<&Signal> for SignalSummary {
    fn from(signal: &Signal) -> Self {
        Self {
            id: signal.id,
            symbol: signal.extracted.symbol.clone(),
            side: signal.extracted.side,
            entry_price: signal.extracted.entry,
            stop_loss: signal.extracted.stop_loss,
            take_profit: signal.extracted.take_profit,
            status: signal.status,
        }
    }
}

/// Events pushed over the WebSocket, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    SignalReceived {
        signal: SignalSummary,
    },
    TelegramMessage {
        category: MessageCategory,
        channel_id: i64,
        text: String,
        timestamp: DateTime<Utc>,
    },
    SignalApprovalRequired {
        signal_id: Uuid,
        execution_id: Uuid,
        symbol: String,
        side: Side,
        #[serde(skip_serializing_if = "Option::is_none")]
        entry_price: Option<Decimal>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stop_loss: Option<Decimal>,
        #[serde(skip_serializing_if = "Option::is_none")]
        take_profit: Option<Decimal>,
    },
    ExecutionUpdate {
        execution_id: Uuid,
        status: ExecutionPhase,
        #[serde(skip_serializing_if = "Option::is_none")]
        symbol: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        ticket: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        execution_id: Option<Uuid>,
        message: String,
    },
    PositionUpdate {
        execution_id: Uuid,
        profit_loss: Decimal,
        price_current: Decimal,
    },
    PositionClosed {
        execution_id: Uuid,
        profit_loss: Decimal,
        close_price: Decimal,
    },
    SignalUpdate {
        signal_id: Uuid,
        status: SignalStatus,
    },
    Log {
        level: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    Ping {
        timestamp: DateTime<Utc>,
    },
}

struct HubSession {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
pub struct NotificationHub {
    sessions: RwLock<HashMap<Uuid, Vec<HubSession>>>,
    next_session_id: AtomicU64,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a UI session for a user. The returned receiver feeds
    /// the session's socket writer.
    pub fn attach(&self, user_id: Uuid) -> (u64, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        let mut sessions = self.sessions.write().expect("hub lock poisoned");
        sessions
            .entry(user_id)
            .or_default()
            .push(HubSession { id: session_id, tx });

        tracing::info!("WebSocket session {} attached for user {}", session_id, user_id);
        (session_id, rx)
    }

    pub fn detach(&self, user_id: Uuid, session_id: u64) {
        let mut sessions = self.sessions.write().expect("hub lock poisoned");
        if let Some(list) = sessions.get_mut(&user_id) {
            list.retain(|s| s.id != session_id);
            if list.is_empty() {
                sessions.remove(&user_id);
            }
        }
        tracing::info!("WebSocket session {} detached for user {}", session_id, user_id);
    }

    pub fn session_count(&self, user_id: Uuid) -> usize {
        self.sessions
            .read()
            .expect("hub lock poisoned")
            .get(&user_id)
            .map(|list| list.len())
            .unwrap_or(0)
    }

    pub fn send_to_user(&self, user_id: Uuid, event: &Event) {
        let Ok(payload) = serde_json::to_string(event) else {
            tracing::error!("Failed to serialize hub event");
            return;
        };
        self.deliver(Some(user_id), &payload);
    }

    pub fn broadcast_all(&self, event: &Event) {
        let Ok(payload) = serde_json::to_string(event) else {
            tracing::error!("Failed to serialize hub event");
            return;
        };
        self.deliver(None, &payload);
    }

    fn deliver(&self, user_id: Option<Uuid>, payload: &str) {
        let mut dead: Vec<(Uuid, u64)> = Vec::new();

        {
            let sessions = self.sessions.read().expect("hub lock poisoned");
            let targets: Box<dyn Iterator<Item = (&Uuid, &Vec<HubSession>)> + '_> = match &user_id {
                Some(id) => Box::new(sessions.get_key_value(id).into_iter()),
                None => Box::new(sessions.iter()),
            };

            for (uid, list) in targets {
                for session in list {
                    if session.tx.send(payload.to_string()).is_err() {
                        dead.push((*uid, session.id));
                    }
                }
            }
        }

        for (uid, session_id) in dead {
            tracing::warn!("Dropping dead WebSocket session {} for user {}", session_id, uid);
            self.detach(uid, session_id);
        }
    }

    /// Periodic ping keeping sessions warm.
    pub fn start_heartbeat(self: &Arc<Self>, interval_secs: u64) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
            loop {
                interval.tick().await;
                hub.broadcast_all(&Event::Ping {
                    timestamp: Utc::now(),
                });
            }
        })
    }
}

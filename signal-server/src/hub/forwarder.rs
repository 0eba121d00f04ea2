//! Human-readable signal rebroadcast to external subscribers.

use std::sync::Arc;

use crate::db::Database;
use crate::models::Extraction;
use crate::source::MessageSource;
use uuid::Uuid;

pub struct SignalForwarder {
    db: Arc<Database>,
    source: Arc<dyn MessageSource>,
}

impl SignalForwarder {
    pub fn new(db: Arc<Database>, source: Arc<dyn MessageSource>) -> Self {
        Self { db, source }
    }

    /// Send the reformatted signal to every active subscriber of the
    /// owning user. Per-subscriber failures are logged and skipped.
    pub async fn forward(&self, user_id: Uuid, extraction: &Extraction) {
        let subscribers = match self.db.active_subscribers(user_id).await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                tracing::error!("Failed to load subscribers for user {}: {}", user_id, e);
                return;
            }
        };

        if subscribers.is_empty() {
            return;
        }

        let text = format_signal(extraction);
        for subscriber in subscribers {
            match self.source.send_message(&subscriber.address, &text).await {
                Ok(()) => {
                    tracing::info!("Forwarded reformatted signal to {}", subscriber.label);
                }
                Err(e) => {
                    tracing::error!("Failed to forward to {}: {}", subscriber.label, e);
                }
            }
        }
    }
}

pub fn format_signal(extraction: &Extraction) -> String {
    let side = extraction
        .side
        .map(|s| s.as_str().to_uppercase())
        .unwrap_or_else(|| "SIGNAL".to_string());
    let symbol = extraction.symbol.as_deref().unwrap_or("UNKNOWN");

    let entry_text = match (&extraction.entry_range, &extraction.entry) {
        (Some(range), _) => format!("{} - {}", range.low, range.high),
        (None, Some(entry)) => entry.to_string(),
        (None, None) => "Market".to_string(),
    };

    let sl_text = extraction
        .stop_loss
        .map(|sl| sl.to_string())
        .unwrap_or_else(|| "-".to_string());

    let tp_lines = if extraction.take_profits.is_empty() {
        "🔹 **TP:** -".to_string()
    } else {
        extraction
            .take_profits
            .iter()
            .enumerate()
            .map(|(i, tp)| format!("🔹 **TP{}:** {}", i + 1, tp))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "🔔 **{side}: {symbol}**\n\
         ━━━━━━━━━━━━━━\n\
         🔹 **Entry:** {entry_text}\n\
         🔹 **SL:** {sl_text}\n\
         {tp_lines}"
    )
}

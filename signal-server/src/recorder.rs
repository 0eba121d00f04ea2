//! Signal recorder: classifies inbound messages, persists the raw and
//! extracted record with its audit entry, and routes actionable signals
//! to the execution engine.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::classifier::Classifier;
use crate::db::Database;
use crate::hub::{Event, NotificationHub, SignalForwarder, SignalSummary};
use crate::models::{Signal, SignalStatus};
use crate::source::{ChannelHandler, HandlerFuture, InboundMessage};

/// Downstream consumer of recorded actionable signals.
#[async_trait]
pub trait SignalHandler: Send + Sync {
    async fn on_actionable_signal(&self, signal: &Signal);
}

pub struct SignalRecorder {
    db: Arc<Database>,
    classifier: Classifier,
    hub: Arc<NotificationHub>,
    forwarder: SignalForwarder,
    sink: Arc<dyn SignalHandler>,
}

impl SignalRecorder {
    pub fn new(
        db: Arc<Database>,
        classifier: Classifier,
        hub: Arc<NotificationHub>,
        forwarder: SignalForwarder,
        sink: Arc<dyn SignalHandler>,
    ) -> Self {
        Self {
            db,
            classifier,
            hub,
            forwarder,
            sink,
        }
    }

    /// Process one delivered message for one subscribing user.
    pub async fn handle(&self, user_id: Uuid, message: InboundMessage) {
        tracing::info!(
            "Processing message from channel {} for user {}",
            message.channel_id,
            user_id
        );

        let channel = match self
            .db
            .get_channel_by_external(message.channel_id, user_id)
            .await
        {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                tracing::warn!(
                    "Channel {} not registered for user {}, dropping message",
                    message.channel_id,
                    user_id
                );
                return;
            }
            Err(e) => {
                tracing::error!("Channel lookup failed: {}", e);
                return;
            }
        };

        let extracted = self.classifier.parse(&message.text).await;
        let actionable = extracted.is_actionable();

        let signal = Signal {
            id: Uuid::new_v4(),
            user_id,
            channel_id: channel.id,
            raw_text: message.text.clone(),
            category: extracted.category,
            modification_type: extracted.modification_type,
            actionable,
            status: SignalStatus::Pending,
            received_at: message.received_at,
            processed_at: None,
            extracted,
        };

        // Signal row and audit entry commit together; nothing is
        // emitted downstream when the write fails.
        let audit_details = json!({
            "channel": channel.label,
            "category": signal.category.as_str(),
            "symbol": signal.extracted.symbol,
        });
        if let Err(e) = self
            .db
            .record_signal(&signal, "signal_received", audit_details)
            .await
        {
            tracing::error!("Failed to record signal: {}", e);
            return;
        }

        tracing::info!("Signal recorded: {} [{}]", signal.id, signal.category.as_str());

        if !actionable {
            self.hub.send_to_user(
                user_id,
                &Event::TelegramMessage {
                    category: signal.category,
                    channel_id: message.channel_id,
                    text: message.text,
                    timestamp: message.received_at,
                },
            );
            return;
        }

        self.hub.send_to_user(
            user_id,
            &Event::SignalReceived {
                signal: SignalSummary::from(&signal),
            },
        );

        self.forwarder.forward(user_id, &signal.extracted).await;

        self.sink.on_actionable_signal(&signal).await;
    }
}

/// Binds a recorder to one subscribing user so it can be registered as
/// a per-channel handler on the message source.
pub struct ChannelRecorder {
    recorder: Arc<SignalRecorder>,
    user_id: Uuid,
}

impl ChannelRecorder {
    pub fn new(recorder: Arc<SignalRecorder>, user_id: Uuid) -> Self {
        Self { recorder, user_id }
    }
}

impl ChannelHandler for ChannelRecorder {
    fn handle(&self, message: InboundMessage) -> HandlerFuture {
        let recorder = self.recorder.clone();
        let user_id = self.user_id;
        Box::pin(async move {
            recorder.handle(user_id, message).await;
        })
    }
}

//! Chat feed abstraction.
//!
//! One implementation binds one chat account session. Authorization is
//! an out-of-process concern: `connect` fails with a diagnostic when the
//! session is not already authorized, it never prompts interactively.

mod bridge;

pub use bridge::BridgeSource;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DomainResult;

/// One delivered chat message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// External channel id the message arrived on
    pub channel_id: i64,
    pub received_at: DateTime<Utc>,
    pub text: String,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Per-channel message callback. Registered once per channel
/// subscription; invoked for every delivered message.
pub trait ChannelHandler: Send + Sync {
    fn handle(&self, message: InboundMessage) -> HandlerFuture;
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Bind the chat session. Fails when the session is not
    /// pre-authorized.
    async fn connect(&self) -> DomainResult<()>;

    async fn disconnect(&self);

    /// Register a handler for a channel by external id. Returns false
    /// when the channel cannot be resolved.
    async fn subscribe(
        &self,
        channel_external_id: i64,
        handler: Arc<dyn ChannelHandler>,
    ) -> DomainResult<bool>;

    /// Deliver messages until disconnected. Implementations spawn a
    /// short-lived task per delivered message, so cancelling the run
    /// loop leaves in-flight handlers to finish on their own.
    async fn run(&self) -> DomainResult<()>;

    /// Send a text message to an external address (used for signal
    /// rebroadcast to subscribers).
    async fn send_message(&self, address: &str, text: &str) -> DomainResult<()>;
}

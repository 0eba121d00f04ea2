//! In-process bridge message source.
//!
//! Stands in for the chat transport: an external feed pushes raw
//! messages through `inject`, and the bridge dispatches them to every
//! handler registered for the channel. Outbound sends are recorded and
//! logged. The session must be marked authorized up front; there is no
//! interactive login path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use super::{ChannelHandler, InboundMessage, MessageSource};
use crate::error::{DomainError, DomainResult};

pub struct BridgeSource {
    authorized: bool,
    connected: AtomicBool,
    handlers: RwLock<HashMap<i64, Vec<Arc<dyn ChannelHandler>>>>,
    outbox: Mutex<Vec<(String, String)>>,
    shutdown: Notify,
}

impl BridgeSource {
    pub fn new(authorized: bool) -> Self {
        Self {
            authorized,
            connected: AtomicBool::new(false),
            handlers: RwLock::new(HashMap::new()),
            outbox: Mutex::new(Vec::new()),
            shutdown: Notify::new(),
        }
    }

    /// Deliver one raw message to every handler subscribed to the
    /// channel. Returns the number of handlers invoked.
    pub async fn inject(&self, channel_id: i64, text: &str) -> usize {
        let handlers: Vec<Arc<dyn ChannelHandler>> = {
            let map = self.handlers.read().expect("handler lock poisoned");
            map.get(&channel_id).cloned().unwrap_or_default()
        };

        for handler in &handlers {
            handler
                .handle(InboundMessage {
                    channel_id,
                    received_at: Utc::now(),
                    text: text.to_string(),
                })
                .await;
        }

        handlers.len()
    }

    /// Messages sent out through this source, oldest first.
    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.outbox.lock().expect("outbox lock poisoned").clone()
    }
}

#[async_trait]
impl MessageSource for BridgeSource {
    async fn connect(&self) -> DomainResult<()> {
        if !self.authorized {
            return Err(DomainError::Fatal(
                "chat session is not authorized; run the out-of-process login flow first".into(),
            ));
        }
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!("Bridge message source connected");
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
        tracing::info!("Bridge message source disconnected");
    }

    async fn subscribe(
        &self,
        channel_external_id: i64,
        handler: Arc<dyn ChannelHandler>,
    ) -> DomainResult<bool> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(DomainError::Validation("message source not connected".into()));
        }

        self.handlers
            .write()
            .expect("handler lock poisoned")
            .entry(channel_external_id)
            .or_default()
            .push(handler);

        Ok(true)
    }

    async fn run(&self) -> DomainResult<()> {
        self.shutdown.notified().await;
        Ok(())
    }

    async fn send_message(&self, address: &str, text: &str) -> DomainResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(DomainError::Validation("message source not connected".into()));
        }

        self.outbox
            .lock()
            .expect("outbox lock poisoned")
            .push((address.to_string(), text.to_string()));
        tracing::debug!("Outbound message queued for {}", address);
        Ok(())
    }
}

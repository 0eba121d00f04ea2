//! Tracing layer that republishes WARN and ERROR records to connected
//! UI sessions as `log` events.

use std::sync::Arc;

use chrono::Utc;
use tracing::Subscriber;
use tracing_subscriber::Layer;

use super::{Event, NotificationHub};

pub struct HubLogLayer {
    hub: Arc<NotificationHub>,
}

impl HubLogLayer {
    pub fn new(hub: Arc<NotificationHub>) -> Self {
        Self { hub }
    }
}

impl<S> Layer<S> for HubLogLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let level = *event.metadata().level();
        if level > tracing::Level::WARN {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.hub.broadcast_all(&Event::Log {
            level: level.to_string().to_lowercase(),
            message: visitor.message,
            timestamp: Utc::now(),
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

/// Debug formatting wraps string values in quotes; peel them off so
/// the UI sees the plain message.
fn strip_debug_quotes(formatted: String) -> String {
    formatted
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .map(|s| s.to_string())
        .unwrap_or(formatted)
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = strip_debug_quotes(format!("{:?}", value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

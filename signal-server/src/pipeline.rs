//! Pipeline coordinator: wires the message source, signal recorder,
//! synchronizer, and hub heartbeat together, and owns their lifecycle.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::broker::BrokerGateway;
use crate::db::Database;
use crate::error::{DomainError, DomainResult};
use crate::hub::NotificationHub;
use crate::recorder::{ChannelRecorder, SignalRecorder};
use crate::source::MessageSource;
use crate::sync::PositionSynchronizer;

struct RunningTasks {
    listener: JoinHandle<()>,
    synchronizer: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
    channel_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub running: bool,
    pub channels: usize,
}

pub struct Pipeline {
    db: Arc<Database>,
    source: Arc<dyn MessageSource>,
    recorder: Arc<SignalRecorder>,
    synchronizer: Arc<PositionSynchronizer>,
    gateway: Arc<BrokerGateway>,
    hub: Arc<NotificationHub>,
    ping_interval_secs: u64,
    running: Mutex<Option<RunningTasks>>,
}

impl Pipeline {
    pub fn new(
        db: Arc<Database>,
        source: Arc<dyn MessageSource>,
        recorder: Arc<SignalRecorder>,
        synchronizer: Arc<PositionSynchronizer>,
        gateway: Arc<BrokerGateway>,
        hub: Arc<NotificationHub>,
        ping_interval_secs: u64,
    ) -> Self {
        Self {
            db,
            source,
            recorder,
            synchronizer,
            gateway,
            hub,
            ping_interval_secs,
            running: Mutex::new(None),
        }
    }

    /// Connect the message source, register one handler per active
    /// channel subscription, and start the background loops. Starting
    /// an already running pipeline is a no-op.
    pub async fn start(&self) -> DomainResult<PipelineStatus> {
        let mut running = self.running.lock().await;
        if let Some(tasks) = running.as_ref() {
            tracing::info!("Pipeline already running");
            return Ok(PipelineStatus {
                running: true,
                channels: tasks.channel_count,
            });
        }

        self.source.connect().await?;

        let channels = self
            .db
            .list_active_channels()
            .await
            .map_err(DomainError::from)?;

        let mut registered = 0usize;
        for channel in &channels {
            let handler = Arc::new(ChannelRecorder::new(self.recorder.clone(), channel.user_id));
            match self.source.subscribe(channel.external_id, handler).await {
                Ok(true) => {
                    tracing::info!(
                        "Listening to channel {} ({}) for user {}",
                        channel.label,
                        channel.external_id,
                        channel.user_id
                    );
                    registered += 1;
                }
                Ok(false) => {
                    tracing::warn!(
                        "Could not resolve channel {} ({})",
                        channel.label,
                        channel.external_id
                    );
                }
                Err(e) => {
                    tracing::error!("Failed to register channel {}: {}", channel.external_id, e);
                }
            }
        }

        tracing::info!("Listener started. Monitoring {} channel(s).", registered);

        let listener = {
            let source = self.source.clone();
            tokio::spawn(async move {
                if let Err(e) = source.run().await {
                    tracing::error!("Message source stopped with error: {}", e);
                }
            })
        };

        let synchronizer = self.synchronizer.start();
        let heartbeat = self.hub.start_heartbeat(self.ping_interval_secs);

        *running = Some(RunningTasks {
            listener,
            synchronizer,
            heartbeat,
            channel_count: registered,
        });

        Ok(PipelineStatus {
            running: true,
            channels: registered,
        })
    }

    /// Stop in dependency order: listener first, then synchronizer,
    /// then heartbeat, then the external connections. Handler tasks
    /// spawned by the source finish their current broker call on their
    /// own; nothing here aborts them.
    pub async fn stop(&self) -> PipelineStatus {
        let tasks = self.running.lock().await.take();

        if let Some(tasks) = tasks {
            tasks.listener.abort();
            tasks.synchronizer.abort();
            tasks.heartbeat.abort();
        }

        self.source.disconnect().await;
        self.gateway.disconnect_all().await;

        tracing::info!("Pipeline stopped");
        PipelineStatus {
            running: false,
            channels: 0,
        }
    }

    pub async fn status(&self) -> PipelineStatus {
        let running = self.running.lock().await;
        match running.as_ref() {
            Some(tasks) => PipelineStatus {
                running: true,
                channels: tasks.channel_count,
            },
            None => PipelineStatus {
                running: false,
                channels: 0,
            },
        }
    }
}

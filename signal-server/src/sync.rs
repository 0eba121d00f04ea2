//! Position synchronizer: periodic reconciler between executed
//! positions and broker-reported state.
//!
//! Each tick pulls the broker's open-positions list once per broker
//! account, refreshes live P&L, and detects closures through the
//! historical deal lookup. A tick failure is logged and the next tick
//! continues; the loop never escapes.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::broker::BrokerGateway;
use crate::db::Database;
use crate::hub::{Event, NotificationHub};
use crate::models::{Execution, ExecutionState, CREDENTIAL_TYPE_BROKER_PASSWORD};
use crate::vault::CredentialVault;

pub struct PositionSynchronizer {
    db: Arc<Database>,
    gateway: Arc<BrokerGateway>,
    vault: Arc<CredentialVault>,
    hub: Arc<NotificationHub>,
    interval_secs: u64,
}

impl PositionSynchronizer {
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<BrokerGateway>,
        vault: Arc<CredentialVault>,
        hub: Arc<NotificationHub>,
        interval_secs: u64,
    ) -> Self {
        Self {
            db,
            gateway,
            vault,
            hub,
            interval_secs,
        }
    }

    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let sync = self.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(sync.interval_secs.max(1)));
            loop {
                interval.tick().await;
                if let Err(e) = sync.sync_tick().await {
                    tracing::error!("Error in sync tick: {}", e);
                }
            }
        })
    }

    /// One reconciliation pass over every open execution.
    pub async fn sync_tick(&self) -> Result<()> {
        let open = self.db.executions_in_state(ExecutionState::Executed).await?;
        if open.is_empty() {
            return Ok(());
        }

        let mut by_broker: HashMap<Uuid, Vec<Execution>> = HashMap::new();
        for execution in open {
            by_broker
                .entry(execution.broker_account_id)
                .or_default()
                .push(execution);
        }

        for (broker_account_id, executions) in by_broker {
            if let Err(e) = self.sync_broker_positions(broker_account_id, executions).await {
                tracing::error!("Error syncing broker {}: {}", broker_account_id, e);
            }
        }

        Ok(())
    }

    async fn sync_broker_positions(
        &self,
        broker_account_id: Uuid,
        executions: Vec<Execution>,
    ) -> Result<()> {
        let Some(account) = self.db.get_broker_account(broker_account_id).await? else {
            return Ok(());
        };
        let user_id = executions[0].user_id;

        let credentials = self
            .vault
            .broker_credentials(&self.db, user_id, broker_account_id)
            .await?;
        let Some(password) = credentials.get(CREDENTIAL_TYPE_BROKER_PASSWORD) else {
            return Ok(());
        };

        let session = match self
            .gateway
            .session(account.login, password, &account.server)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Broker session for {} unavailable: {}", account.label, e);
                return Ok(());
            }
        };

        // One positions pull per broker account per tick
        let positions = session.list_positions(None).await;
        let open_tickets: HashMap<i64, _> = positions.into_iter().map(|p| (p.ticket, p)).collect();

        for execution in executions {
            let Some(ticket) = execution.ticket else {
                continue;
            };

            if let Some(position) = open_tickets.get(&ticket) {
                self.db
                    .update_execution_profit(execution.id, position.profit)
                    .await?;

                self.hub.send_to_user(
                    user_id,
                    &Event::PositionUpdate {
                        execution_id: execution.id,
                        profit_loss: position.profit,
                        price_current: position.price_current,
                    },
                );
            } else {
                tracing::info!(
                    "Position {} not reported open, checking history...",
                    ticket
                );
                match session.history_deal(ticket).await {
                    Some(deal) => {
                        let closed = self
                            .db
                            .mark_execution_closed(
                                execution.id,
                                deal.price,
                                Some(deal.profit),
                                deal.time,
                            )
                            .await?;
                        if !closed {
                            continue;
                        }

                        self.hub.send_to_user(
                            user_id,
                            &Event::PositionClosed {
                                execution_id: execution.id,
                                profit_loss: deal.profit,
                                close_price: deal.price,
                            },
                        );

                        match self.db.refresh_signal_status(execution.signal_id).await {
                            Ok(Some(status)) => {
                                self.hub.send_to_user(
                                    user_id,
                                    &Event::SignalUpdate {
                                        signal_id: execution.signal_id,
                                        status,
                                    },
                                );
                            }
                            Ok(None) => {}
                            Err(e) => {
                                tracing::error!(
                                    "Failed to refresh signal {} status: {}",
                                    execution.signal_id,
                                    e
                                );
                            }
                        }
                    }
                    // No deal yet: assumed transient, revisit next tick
                    None => {}
                }
            }
        }

        Ok(())
    }
}

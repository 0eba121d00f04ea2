//! Execution engine: drives the per-position state machine from
//! validation through order placement, with manual-approval gating,
//! limit/market selection, and market-to-limit fallback.

mod pricing;

#[cfg(test)]
mod tests;

pub use pricing::{plan_entry, OrderPlan};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::broker::{BrokerGateway, BrokerSession, FillMode, LimitOrderRequest, MarketOrderRequest};
use crate::db::Database;
use crate::error::{DomainError, DomainResult};
use crate::hub::{Event, ExecutionPhase, NotificationHub};
use crate::models::{
    EntryRange, Execution, ExecutionState, Preferences, Side, Signal,
    CREDENTIAL_TYPE_BROKER_PASSWORD,
};
use crate::recorder::SignalHandler;
use crate::vault::CredentialVault;

const MIN_VOLUME: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Manual approval required; nothing was sent to the broker.
    PendingApproval { execution_ids: Vec<Uuid> },
    /// All fan-out positions ran to a resolved state.
    Completed { results: Vec<ExecutionResult> },
}

pub struct ExecutionEngine {
    db: Arc<Database>,
    gateway: Arc<BrokerGateway>,
    vault: Arc<CredentialVault>,
    hub: Arc<NotificationHub>,
}

impl ExecutionEngine {
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<BrokerGateway>,
        vault: Arc<CredentialVault>,
        hub: Arc<NotificationHub>,
    ) -> Self {
        Self {
            db,
            gateway,
            vault,
            hub,
        }
    }

    /// Fan an actionable signal out into one execution per take-profit
    /// target and drive each to a resolved state, or park the batch in
    /// PENDING_APPROVAL when the user requires confirmation.
    pub async fn execute_signal(
        &self,
        signal: &Signal,
        broker_account_id: Uuid,
    ) -> DomainResult<ExecutionOutcome> {
        let extracted = &signal.extracted;

        let symbol = extracted
            .symbol
            .clone()
            .ok_or_else(|| DomainError::Validation("signal missing symbol".into()))?;
        let side = extracted
            .side
            .ok_or_else(|| DomainError::Validation("signal missing side".into()))?;
        if extracted.confidence < 0.5 {
            return Err(DomainError::Validation(format!(
                "low confidence signal: {:.2}",
                extracted.confidence
            )));
        }

        let prefs = self.db.get_preferences(signal.user_id).await?;

        let targets = extracted.fan_out_targets();
        let volume = (prefs.risk_per_trade / Decimal::from(targets.len()))
            .round_dp(2)
            .max(MIN_VOLUME);

        let initial_state = if prefs.manual_approval {
            ExecutionState::PendingApproval
        } else {
            ExecutionState::Pending
        };

        let mut executions = Vec::with_capacity(targets.len());
        for take_profit in &targets {
            let execution = Execution {
                id: Uuid::new_v4(),
                user_id: signal.user_id,
                signal_id: signal.id,
                broker_account_id,
                symbol: symbol.clone(),
                side,
                volume,
                entry_price: extracted.entry,
                stop_loss: extracted.stop_loss,
                take_profit: *take_profit,
                state: initial_state,
                ticket: None,
                actual_entry_price: None,
                executed_at: None,
                close_price: None,
                close_time: None,
                profit_loss: None,
                error: None,
                created_at: Utc::now(),
            };
            self.db.insert_execution(&execution).await?;
            executions.push(execution);
        }

        tracing::info!(
            "Signal {} fanned out into {} execution(s), volume {} each",
            signal.id,
            executions.len(),
            volume
        );

        if prefs.manual_approval {
            for execution in &executions {
                self.hub.send_to_user(
                    execution.user_id,
                    &Event::SignalApprovalRequired {
                        signal_id: signal.id,
                        execution_id: execution.id,
                        symbol: execution.symbol.clone(),
                        side: execution.side,
                        entry_price: execution.entry_price,
                        stop_loss: execution.stop_loss,
                        take_profit: execution.take_profit,
                    },
                );
            }
            return Ok(ExecutionOutcome::PendingApproval {
                execution_ids: executions.iter().map(|e| e.id).collect(),
            });
        }

        let mut results = Vec::with_capacity(executions.len());
        for execution in executions {
            results.push(
                self.process(execution, &prefs, extracted.entry_range)
                    .await,
            );
        }

        Ok(ExecutionOutcome::Completed { results })
    }

    /// Resume one parked or failed execution, with optional SL/TP
    /// overrides, re-entering the state machine at validation.
    pub async fn confirm(
        &self,
        execution_id: Uuid,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> DomainResult<ExecutionResult> {
        let execution = self
            .db
            .get_execution(execution_id)
            .await?
            .ok_or(DomainError::NotFound("execution"))?;

        if !matches!(
            execution.state,
            ExecutionState::PendingApproval | ExecutionState::Failed
        ) {
            return Err(DomainError::Validation(
                "only pending approvals or failed executions can be confirmed".into(),
            ));
        }

        self.db
            .update_execution_levels(execution_id, stop_loss, take_profit)
            .await?;
        let execution = self
            .db
            .get_execution(execution_id)
            .await?
            .ok_or(DomainError::NotFound("execution"))?;

        let signal = self
            .db
            .get_signal(execution.signal_id)
            .await?
            .ok_or(DomainError::NotFound("signal"))?;
        if signal.extracted.confidence < 0.5 {
            return Err(DomainError::Validation(format!(
                "low confidence signal: {:.2}",
                signal.extracted.confidence
            )));
        }

        // Validation failure leaves the execution where it was; the
        // user can adjust the overrides or cancel.
        if let Err(reason) = validate_levels(&execution) {
            return Err(DomainError::Validation(reason));
        }

        let from = execution.state;
        if !self
            .db
            .transition_execution(execution_id, from, ExecutionState::Validated)
            .await?
        {
            return Err(DomainError::Validation(
                "execution state changed concurrently".into(),
            ));
        }

        let prefs = self.db.get_preferences(execution.user_id).await?;
        self.run_validated(execution, &prefs, signal.extracted.entry_range)
            .await
    }

    /// Reject a parked execution.
    pub async fn cancel(&self, execution_id: Uuid) -> DomainResult<()> {
        let execution = self
            .db
            .get_execution(execution_id)
            .await?
            .ok_or(DomainError::NotFound("execution"))?;

        if execution.state != ExecutionState::PendingApproval {
            return Err(DomainError::Validation(
                "only pending approvals can be cancelled".into(),
            ));
        }

        if !self
            .db
            .transition_execution(
                execution_id,
                ExecutionState::PendingApproval,
                ExecutionState::Cancelled,
            )
            .await?
        {
            return Err(DomainError::Validation(
                "execution state changed concurrently".into(),
            ));
        }

        tracing::info!("Execution rejected: {}", execution_id);
        self.refresh_signal(execution.user_id, execution.signal_id)
            .await;
        Ok(())
    }

    /// Close an open position at the broker.
    pub async fn close(&self, execution_id: Uuid) -> DomainResult<Execution> {
        let execution = self
            .db
            .get_execution(execution_id)
            .await?
            .ok_or(DomainError::NotFound("execution"))?;

        let ticket = execution
            .ticket
            .ok_or_else(|| DomainError::Validation("no ticket number for position".into()))?;
        if execution.state != ExecutionState::Executed {
            return Err(DomainError::Validation(
                "only open positions can be closed".into(),
            ));
        }

        let session = self.broker_session(&execution).await?;
        let closed = session.close_position(&execution.symbol, ticket).await?;

        self.db
            .mark_execution_closed(
                execution_id,
                closed.close_price,
                closed.profit_loss,
                closed.closed_at,
            )
            .await?;

        self.hub.send_to_user(
            execution.user_id,
            &Event::PositionClosed {
                execution_id,
                profit_loss: closed.profit_loss.unwrap_or(Decimal::ZERO),
                close_price: closed.close_price,
            },
        );

        tracing::info!(
            "Position closed: {} ticket {} P&L {:?}",
            execution_id,
            ticket,
            closed.profit_loss
        );

        self.db
            .get_execution(execution_id)
            .await?
            .ok_or(DomainError::NotFound("execution"))
    }

    /// Adjust SL/TP on an open position.
    pub async fn modify(
        &self,
        execution_id: Uuid,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> DomainResult<Execution> {
        let execution = self
            .db
            .get_execution(execution_id)
            .await?
            .ok_or(DomainError::NotFound("execution"))?;

        let ticket = execution
            .ticket
            .ok_or_else(|| DomainError::Validation("no ticket number for position".into()))?;

        let session = self.broker_session(&execution).await?;
        session
            .modify_position(ticket, stop_loss, take_profit)
            .await?;

        self.db
            .update_execution_levels(execution_id, stop_loss, take_profit)
            .await?;

        self.db
            .get_execution(execution_id)
            .await?
            .ok_or(DomainError::NotFound("execution"))
    }

    async fn broker_session(&self, execution: &Execution) -> DomainResult<Arc<BrokerSession>> {
        let account = self
            .db
            .get_broker_account(execution.broker_account_id)
            .await?
            .ok_or(DomainError::NotFound("broker account"))?;

        let credentials = self
            .vault
            .broker_credentials(&self.db, execution.user_id, account.id)
            .await?;
        let password = credentials
            .get(CREDENTIAL_TYPE_BROKER_PASSWORD)
            .ok_or_else(|| DomainError::Validation("broker password not configured".into()))?;

        self.gateway
            .session(account.login, password, &account.server)
            .await
    }

    /// Drive one freshly created execution from PENDING to a resolved
    /// state. Infrastructure errors are folded into a failed result.
    async fn process(
        &self,
        execution: Execution,
        prefs: &Preferences,
        entry_range: Option<EntryRange>,
    ) -> ExecutionResult {
        let execution_id = execution.id;
        let user_id = execution.user_id;
        let signal_id = execution.signal_id;

        match self.process_inner(execution, prefs, entry_range).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Error executing position {}: {}", execution_id, e);
                self.hub.send_to_user(
                    user_id,
                    &Event::Error {
                        execution_id: Some(execution_id),
                        message: e.to_string(),
                    },
                );
                self.refresh_signal(user_id, signal_id).await;
                ExecutionResult {
                    execution_id,
                    success: false,
                    ticket: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn process_inner(
        &self,
        execution: Execution,
        prefs: &Preferences,
        entry_range: Option<EntryRange>,
    ) -> DomainResult<ExecutionResult> {
        if let Err(reason) = validate_levels(&execution) {
            tracing::warn!("Execution {} failed validation: {}", execution.id, reason);
            self.db
                .fail_execution(execution.id, execution.state, &reason)
                .await?;
            self.hub.send_to_user(
                execution.user_id,
                &Event::Error {
                    execution_id: Some(execution.id),
                    message: reason.clone(),
                },
            );
            self.refresh_signal(execution.user_id, execution.signal_id)
                .await;
            return Ok(ExecutionResult {
                execution_id: execution.id,
                success: false,
                ticket: None,
                error: Some(reason),
            });
        }

        if !self
            .db
            .transition_execution(execution.id, execution.state, ExecutionState::Validated)
            .await?
        {
            return Err(DomainError::Validation(
                "execution state changed concurrently".into(),
            ));
        }

        self.run_validated(execution, prefs, entry_range).await
    }

    /// Continue from VALIDATED: every subsequent failure lands in
    /// FAILED via the EXECUTING edge.
    async fn run_validated(
        &self,
        execution: Execution,
        prefs: &Preferences,
        entry_range: Option<EntryRange>,
    ) -> DomainResult<ExecutionResult> {
        self.db
            .transition_execution(execution.id, ExecutionState::Validated, ExecutionState::Executing)
            .await?;

        self.hub.send_to_user(
            execution.user_id,
            &Event::ExecutionUpdate {
                execution_id: execution.id,
                status: ExecutionPhase::Executing,
                symbol: Some(execution.symbol.clone()),
                ticket: None,
                message: None,
            },
        );

        let session = match self.broker_session(&execution).await {
            Ok(session) => session,
            Err(e) => return self.fail_executing(&execution, &e.to_string()).await,
        };

        let quote = session.quote(&execution.symbol).await;
        let plan = plan_entry(
            execution.side,
            execution.entry_price,
            entry_range,
            quote.as_ref(),
            prefs,
        );

        let comment = format!("Signal {}", execution.signal_id);
        let (ticket, actual_entry, executed_at) = match plan {
            OrderPlan::Limit { price } => {
                tracing::info!(
                    "Placing LIMIT order: {} {} at {}",
                    execution.symbol,
                    execution.side.as_str(),
                    price
                );
                match session
                    .limit_order(LimitOrderRequest {
                        symbol: execution.symbol.clone(),
                        side: execution.side,
                        price,
                        volume: execution.volume,
                        stop_loss: execution.stop_loss,
                        take_profit: execution.take_profit,
                        expiration: None,
                        comment,
                    })
                    .await
                {
                    Ok(placement) => (placement.ticket, price, placement.placed_at),
                    // A failed limit is not retried
                    Err(e) => return self.fail_executing(&execution, &e.to_string()).await,
                }
            }
            OrderPlan::Market => {
                tracing::info!(
                    "Executing MARKET order: {} {}",
                    execution.symbol,
                    execution.side.as_str()
                );
                let fill_mode = quote
                    .as_ref()
                    .map(|q| FillMode::from_filling_mask(q.filling_mode))
                    .unwrap_or(FillMode::Return);

                let market = session
                    .market_order(MarketOrderRequest {
                        symbol: execution.symbol.clone(),
                        side: execution.side,
                        volume: execution.volume,
                        stop_loss: execution.stop_loss,
                        take_profit: execution.take_profit,
                        fill_mode,
                        comment: comment.clone(),
                    })
                    .await;

                match (market, execution.entry_price) {
                    (Ok(fill), _) => (fill.ticket, fill.entry_price, fill.executed_at),
                    (Err(e), Some(entry)) => {
                        // Market-to-limit fallback at the planned entry
                        tracing::warn!(
                            "Market order failed: {}. Falling back to LIMIT at {}",
                            e,
                            entry
                        );
                        self.hub.send_to_user(
                            execution.user_id,
                            &Event::ExecutionUpdate {
                                execution_id: execution.id,
                                status: ExecutionPhase::FallingBack,
                                symbol: Some(execution.symbol.clone()),
                                ticket: None,
                                message: Some(format!(
                                    "Market order failed, placing limit order at {}",
                                    entry
                                )),
                            },
                        );

                        match session
                            .limit_order(LimitOrderRequest {
                                symbol: execution.symbol.clone(),
                                side: execution.side,
                                price: entry,
                                volume: execution.volume,
                                stop_loss: execution.stop_loss,
                                take_profit: execution.take_profit,
                                expiration: None,
                                comment: format!("Signal {} (Fallback)", execution.signal_id),
                            })
                            .await
                        {
                            Ok(placement) => (placement.ticket, entry, placement.placed_at),
                            Err(e2) => {
                                return self.fail_executing(&execution, &e2.to_string()).await
                            }
                        }
                    }
                    (Err(e), None) => {
                        return self.fail_executing(&execution, &e.to_string()).await
                    }
                }
            }
        };

        self.db
            .mark_execution_executed(execution.id, ticket, actual_entry, executed_at)
            .await?;

        tracing::info!("Order executed: ticket {}", ticket);
        self.hub.send_to_user(
            execution.user_id,
            &Event::ExecutionUpdate {
                execution_id: execution.id,
                status: ExecutionPhase::Executed,
                symbol: None,
                ticket: Some(ticket),
                message: None,
            },
        );

        self.refresh_signal(execution.user_id, execution.signal_id)
            .await;

        Ok(ExecutionResult {
            execution_id: execution.id,
            success: true,
            ticket: Some(ticket),
            error: None,
        })
    }

    async fn fail_executing(
        &self,
        execution: &Execution,
        error: &str,
    ) -> DomainResult<ExecutionResult> {
        self.db
            .fail_execution(execution.id, ExecutionState::Executing, error)
            .await?;

        self.hub.send_to_user(
            execution.user_id,
            &Event::Error {
                execution_id: Some(execution.id),
                message: error.to_string(),
            },
        );

        self.refresh_signal(execution.user_id, execution.signal_id)
            .await;

        Ok(ExecutionResult {
            execution_id: execution.id,
            success: false,
            ticket: None,
            error: Some(error.to_string()),
        })
    }

    async fn refresh_signal(&self, user_id: Uuid, signal_id: Uuid) {
        match self.db.refresh_signal_status(signal_id).await {
            Ok(Some(status)) => {
                self.hub.send_to_user(
                    user_id,
                    &Event::SignalUpdate { signal_id, status },
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Failed to refresh signal {} status: {}", signal_id, e);
            }
        }
    }
}

/// Orientation rule: with entry, SL and TP all present, a buy needs
/// SL < entry < TP and a sell needs TP < entry < SL.
fn validate_levels(execution: &Execution) -> Result<(), String> {
    let (Some(entry), Some(sl), Some(tp)) = (
        execution.entry_price,
        execution.stop_loss,
        execution.take_profit,
    ) else {
        return Ok(());
    };

    match execution.side {
        Side::Buy => {
            if !(sl < entry && entry < tp) {
                return Err(format!(
                    "Buy signal: invalid price levels (SL:{} should be below entry:{}, TP:{} above)",
                    sl, entry, tp
                ));
            }
        }
        Side::Sell => {
            if !(tp < entry && entry < sl) {
                return Err(format!(
                    "Sell signal: invalid price levels (TP:{} should be below entry:{}, SL:{} above)",
                    tp, entry, sl
                ));
            }
        }
    }

    Ok(())
}

#[async_trait]
impl SignalHandler for ExecutionEngine {
    /// Execute an actionable signal against every broker account the
    /// user has configured.
    async fn on_actionable_signal(&self, signal: &Signal) {
        let accounts = match self.db.list_broker_accounts(signal.user_id).await {
            Ok(accounts) => accounts,
            Err(e) => {
                tracing::error!("Failed to load broker accounts: {}", e);
                return;
            }
        };

        if accounts.is_empty() {
            tracing::warn!(
                "No broker accounts for user {}, skipping execution",
                signal.user_id
            );
            return;
        }

        for account in accounts {
            tracing::info!("Executing signal {} on broker {}", signal.id, account.label);
            if let Err(e) = self.execute_signal(signal, account.id).await {
                tracing::error!(
                    "Execution of signal {} on {} failed: {}",
                    signal.id,
                    account.label,
                    e
                );
                self.hub.send_to_user(
                    signal.user_id,
                    &Event::Error {
                        execution_id: None,
                        message: e.to_string(),
                    },
                );
            }
        }
    }
}

//! Paper trading backend.
//!
//! Fills orders against seeded quotes and tracks positions in memory.
//! Used when no terminal bridge is configured, and by the end-to-end
//! tests; the contract matches the live adapter exactly, including
//! closed-deal history for the synchronizer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use super::{
    AccountInfo, BrokerApi, BrokerConnector, BrokerResult, ClosedPosition, DealRecord,
    LimitOrderRequest, MarketOrderRequest, ModifiedPosition, OpenPosition, OrderFill,
    OrderPlacement, Quote,
};
use crate::error::DomainError;
use crate::models::Side;

/// Spawns one paper terminal per (login, server) session.
pub struct PaperConnector;

impl BrokerConnector for PaperConnector {
    fn create(&self) -> Arc<dyn BrokerApi> {
        Arc::new(PaperBroker::new())
    }
}

// Standard lot
const CONTRACT_SIZE: i64 = 100_000;

const RETCODE_NOT_CONNECTED: i32 = 10031;
const RETCODE_UNKNOWN_SYMBOL: i32 = 10021;
const RETCODE_POSITION_NOT_FOUND: i32 = 10036;

struct PaperState {
    connected: bool,
    login: i64,
    server: String,
    quotes: HashMap<String, Quote>,
    positions: HashMap<i64, OpenPosition>,
    deals: HashMap<i64, DealRecord>,
    next_ticket: i64,
    balance: Decimal,
}

pub struct PaperBroker {
    state: Mutex<PaperState>,
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PaperState {
                connected: false,
                login: 0,
                server: String::new(),
                quotes: HashMap::new(),
                positions: HashMap::new(),
                deals: HashMap::new(),
                next_ticket: 100_000,
                balance: Decimal::from(10_000),
            }),
        }
    }

    pub fn set_quote(&self, symbol: &str, quote: Quote) {
        self.state
            .lock()
            .expect("paper state poisoned")
            .quotes
            .insert(symbol.to_string(), quote);
    }

    /// Simulate a position closed on the broker side (stop hit, manual
    /// close in the terminal), leaving only a historical deal behind.
    pub fn close_externally(&self, ticket: i64, price: Decimal, profit: Decimal) -> bool {
        let mut state = self.state.lock().expect("paper state poisoned");
        let Some(position) = state.positions.remove(&ticket) else {
            return false;
        };

        state.balance += profit;
        state.deals.insert(
            ticket,
            DealRecord {
                ticket,
                symbol: position.symbol,
                volume: position.volume,
                price,
                profit,
                time: Utc::now(),
            },
        );
        true
    }

    fn floating_profit(position: &OpenPosition, quote: &Quote) -> Decimal {
        let current = match position.side {
            Side::Buy => quote.bid,
            Side::Sell => quote.ask,
        };
        let diff = match position.side {
            Side::Buy => current - position.price_open,
            Side::Sell => position.price_open - current,
        };
        diff * position.volume * Decimal::from(CONTRACT_SIZE)
    }
}

#[async_trait]
impl BrokerApi for PaperBroker {
    async fn connect(&self, login: i64, _password: &str, server: &str) -> BrokerResult<()> {
        let mut state = self.state.lock().expect("paper state poisoned");
        if !state.connected {
            tracing::info!("Paper broker session bound to {}@{}", login, server);
        }
        state.connected = true;
        state.login = login;
        state.server = server.to_string();
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.state.lock().expect("paper state poisoned");
        state.connected = false;
    }

    async fn market_order(&self, request: MarketOrderRequest) -> BrokerResult<OrderFill> {
        let mut state = self.state.lock().expect("paper state poisoned");
        if !state.connected {
            return Err(DomainError::broker(
                "not connected",
                Some(RETCODE_NOT_CONNECTED),
            ));
        }

        let quote = state.quotes.get(&request.symbol).cloned().ok_or_else(|| {
            DomainError::broker(
                format!("symbol {} not found", request.symbol),
                Some(RETCODE_UNKNOWN_SYMBOL),
            )
        })?;

        let entry = match request.side {
            Side::Buy => quote.ask,
            Side::Sell => quote.bid,
        };

        let ticket = state.next_ticket;
        state.next_ticket += 1;

        state.positions.insert(
            ticket,
            OpenPosition {
                ticket,
                symbol: request.symbol,
                volume: request.volume,
                side: request.side,
                price_open: entry,
                price_current: entry,
                stop_loss: request.stop_loss,
                take_profit: request.take_profit,
                profit: Decimal::ZERO,
                comment: request.comment,
            },
        );

        Ok(OrderFill {
            ticket,
            entry_price: entry,
            executed_at: Utc::now(),
        })
    }

    async fn limit_order(&self, request: LimitOrderRequest) -> BrokerResult<OrderPlacement> {
        let mut state = self.state.lock().expect("paper state poisoned");
        if !state.connected {
            return Err(DomainError::broker(
                "not connected",
                Some(RETCODE_NOT_CONNECTED),
            ));
        }
        if !state.quotes.contains_key(&request.symbol) {
            return Err(DomainError::broker(
                format!("symbol {} not found", request.symbol),
                Some(RETCODE_UNKNOWN_SYMBOL),
            ));
        }

        // Paper fills resting orders immediately at the requested price
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        state.positions.insert(
            ticket,
            OpenPosition {
                ticket,
                symbol: request.symbol,
                volume: request.volume,
                side: request.side,
                price_open: request.price,
                price_current: request.price,
                stop_loss: request.stop_loss,
                take_profit: request.take_profit,
                profit: Decimal::ZERO,
                comment: request.comment,
            },
        );

        Ok(OrderPlacement {
            ticket,
            placed_at: Utc::now(),
        })
    }

    async fn close_position(&self, symbol: &str, ticket: i64) -> BrokerResult<ClosedPosition> {
        let mut state = self.state.lock().expect("paper state poisoned");
        if !state.connected {
            return Err(DomainError::broker(
                "not connected",
                Some(RETCODE_NOT_CONNECTED),
            ));
        }

        let Some(position) = state.positions.remove(&ticket) else {
            return Err(DomainError::broker(
                format!("position {} not found", ticket),
                Some(RETCODE_POSITION_NOT_FOUND),
            ));
        };

        let quote = state.quotes.get(symbol).cloned();
        let (close_price, profit) = match quote {
            Some(quote) => {
                let close_price = match position.side {
                    Side::Buy => quote.bid,
                    Side::Sell => quote.ask,
                };
                (close_price, Self::floating_profit(&position, &quote))
            }
            None => (position.price_open, Decimal::ZERO),
        };

        let closed_at = Utc::now();
        state.balance += profit;
        state.deals.insert(
            ticket,
            DealRecord {
                ticket,
                symbol: position.symbol,
                volume: position.volume,
                price: close_price,
                profit,
                time: closed_at,
            },
        );

        Ok(ClosedPosition {
            close_price,
            profit_loss: Some(profit),
            closed_at,
        })
    }

    async fn modify_position(
        &self,
        ticket: i64,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> BrokerResult<ModifiedPosition> {
        let mut state = self.state.lock().expect("paper state poisoned");

        let Some(position) = state.positions.get_mut(&ticket) else {
            return Err(DomainError::broker(
                format!("position {} not found", ticket),
                Some(RETCODE_POSITION_NOT_FOUND),
            ));
        };

        if stop_loss.is_some() {
            position.stop_loss = stop_loss;
        }
        if take_profit.is_some() {
            position.take_profit = take_profit;
        }

        Ok(ModifiedPosition {
            ticket,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
        })
    }

    async fn quote(&self, symbol: &str) -> Option<Quote> {
        self.state
            .lock()
            .expect("paper state poisoned")
            .quotes
            .get(symbol)
            .cloned()
    }

    async fn list_positions(&self, symbol: Option<&str>) -> Vec<OpenPosition> {
        let state = self.state.lock().expect("paper state poisoned");

        state
            .positions
            .values()
            .filter(|p| symbol.map(|s| p.symbol == s).unwrap_or(true))
            .map(|position| {
                let mut position = position.clone();
                if let Some(quote) = state.quotes.get(&position.symbol) {
                    position.price_current = match position.side {
                        Side::Buy => quote.bid,
                        Side::Sell => quote.ask,
                    };
                    position.profit = Self::floating_profit(&position, quote);
                }
                position
            })
            .collect()
    }

    async fn history_deal(&self, ticket: i64) -> Option<DealRecord> {
        self.state
            .lock()
            .expect("paper state poisoned")
            .deals
            .get(&ticket)
            .cloned()
    }

    async fn account_info(&self) -> BrokerResult<AccountInfo> {
        let state = self.state.lock().expect("paper state poisoned");
        if !state.connected {
            return Err(DomainError::broker(
                "not connected",
                Some(RETCODE_NOT_CONNECTED),
            ));
        }

        let floating: Decimal = state
            .positions
            .values()
            .filter_map(|p| {
                state
                    .quotes
                    .get(&p.symbol)
                    .map(|q| Self::floating_profit(p, q))
            })
            .sum();

        Ok(AccountInfo {
            login: state.login,
            server: state.server.clone(),
            balance: state.balance,
            equity: state.balance + floating,
            profit: floating,
            margin: Decimal::ZERO,
            margin_free: state.balance,
            margin_level: Decimal::ZERO,
        })
    }
}

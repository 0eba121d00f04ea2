//! Broker terminal abstraction.
//!
//! `BrokerApi` is the raw terminal contract (one instance binds one
//! terminal session); `BrokerGateway` owns the live sessions, one per
//! (login, server), and serializes requests to each.

mod gateway;
mod paper;

pub use gateway::{BrokerConnector, BrokerGateway, BrokerSession};
pub use paper::{PaperBroker, PaperConnector};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::models::Side;

/// Broker-side order lifetime policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// All-or-nothing immediate
    Fok,
    /// Partial-ok immediate
    Ioc,
    /// Resting
    Return,
}

impl FillMode {
    /// Pick the fill mode from the symbol's advertised filling-mode
    /// bitmask: FOK when bit 0 is set, else IOC when bit 1, else RETURN.
    pub fn from_filling_mask(mask: u32) -> Self {
        if mask & 1 != 0 {
            FillMode::Fok
        } else if mask & 2 != 0 {
            FillMode::Ioc
        } else {
            FillMode::Return
        }
    }
}

/// Current bid/ask and symbol precision data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: Decimal,
    pub ask: Decimal,
    pub point: Decimal,
    pub digits: u32,
    pub spread: i64,
    /// Symbol filling-mode bitmask, used for fill-mode selection
    pub filling_mode: u32,
}

impl Quote {
    /// Pip size: 10 points on 3/5-digit symbols, one point otherwise.
    pub fn pip(&self) -> Decimal {
        if self.digits == 3 || self.digits == 5 {
            self.point * Decimal::TEN
        } else {
            self.point
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarketOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub volume: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub fill_mode: FillMode,
    pub comment: String,
}

#[derive(Debug, Clone)]
pub struct LimitOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub volume: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub expiration: Option<DateTime<Utc>>,
    pub comment: String,
}

/// Result of a filled market order.
#[derive(Debug, Clone)]
pub struct OrderFill {
    pub ticket: i64,
    pub entry_price: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// Result of a placed (resting) limit order.
#[derive(Debug, Clone)]
pub struct OrderPlacement {
    pub ticket: i64,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ClosedPosition {
    pub close_price: Decimal,
    pub profit_loss: Option<Decimal>,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ModifiedPosition {
    pub ticket: i64,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    pub ticket: i64,
    pub symbol: String,
    pub volume: Decimal,
    pub side: Side,
    pub price_open: Decimal,
    pub price_current: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub profit: Decimal,
    pub comment: String,
}

/// Historical deal record for a closed position.
#[derive(Debug, Clone)]
pub struct DealRecord {
    pub ticket: i64,
    pub symbol: String,
    pub volume: Decimal,
    pub price: Decimal,
    pub profit: Decimal,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub login: i64,
    pub server: String,
    pub balance: Decimal,
    pub equity: Decimal,
    pub profit: Decimal,
    pub margin: Decimal,
    pub margin_free: Decimal,
    pub margin_level: Decimal,
}

pub type BrokerResult<T> = Result<T, DomainError>;

/// Raw broker terminal operations. One implementation instance binds
/// one terminal session; connect is idempotent.
#[async_trait]
pub trait BrokerApi: Send + Sync {
    async fn connect(&self, login: i64, password: &str, server: &str) -> BrokerResult<()>;
    async fn disconnect(&self);
    async fn market_order(&self, request: MarketOrderRequest) -> BrokerResult<OrderFill>;
    async fn limit_order(&self, request: LimitOrderRequest) -> BrokerResult<OrderPlacement>;
    async fn close_position(&self, symbol: &str, ticket: i64) -> BrokerResult<ClosedPosition>;
    async fn modify_position(
        &self,
        ticket: i64,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> BrokerResult<ModifiedPosition>;
    async fn quote(&self, symbol: &str) -> Option<Quote>;
    async fn list_positions(&self, symbol: Option<&str>) -> Vec<OpenPosition>;
    async fn history_deal(&self, ticket: i64) -> Option<DealRecord>;
    async fn account_info(&self) -> BrokerResult<AccountInfo>;
}

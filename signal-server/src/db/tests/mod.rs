mod executions_tests;
mod signals_tests;

use chrono::Utc;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use super::Database;
use crate::models::{
    ChannelSubscription, Execution, ExecutionState, Extraction, ExtractionMethod, MessageCategory,
    Side, Signal, SignalStatus, User,
};

pub(crate) async fn test_db() -> Database {
    Database::new("sqlite::memory:")
        .await
        .expect("in-memory database")
}

pub(crate) fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub(crate) async fn seed_user(db: &Database) -> User {
    let suffix = Uuid::new_v4().simple().to_string();
    db.create_user(
        &format!("{}@example.com", &suffix[..8]),
        &format!("trader-{}", &suffix[..8]),
        "$2b$12$hash",
    )
    .await
    .expect("user")
}

pub(crate) async fn seed_channel(db: &Database, user_id: Uuid) -> ChannelSubscription {
    db.create_channel(user_id, -1001234567890, "Gold Signals")
        .await
        .expect("channel")
}

pub(crate) fn actionable_extraction() -> Extraction {
    Extraction {
        category: MessageCategory::ActionableSignal,
        modification_type: None,
        side: Some(Side::Buy),
        symbol: Some("EURUSD".to_string()),
        entry: Some(dec("1.1000")),
        entry_range: None,
        stop_loss: Some(dec("1.0950")),
        take_profit: Some(dec("1.1100")),
        take_profits: vec![dec("1.1100")],
        confidence: 0.9,
        method: ExtractionMethod::Heuristic,
    }
}

pub(crate) fn make_signal(user_id: Uuid, channel_id: Uuid) -> Signal {
    let extracted = actionable_extraction();
    Signal {
        id: Uuid::new_v4(),
        user_id,
        channel_id,
        raw_text: "Buy EURUSD @ 1.1000 SL 1.0950 TP 1.1100".to_string(),
        category: extracted.category,
        modification_type: extracted.modification_type,
        actionable: true,
        status: SignalStatus::Pending,
        received_at: Utc::now(),
        processed_at: None,
        extracted,
    }
}

pub(crate) fn make_execution(
    user_id: Uuid,
    signal_id: Uuid,
    broker_account_id: Uuid,
    state: ExecutionState,
) -> Execution {
    Execution {
        id: Uuid::new_v4(),
        user_id,
        signal_id,
        broker_account_id,
        symbol: "EURUSD".to_string(),
        side: Side::Buy,
        volume: dec("0.1"),
        entry_price: Some(dec("1.1000")),
        stop_loss: Some(dec("1.0950")),
        take_profit: Some(dec("1.1100")),
        state,
        ticket: None,
        actual_entry_price: None,
        executed_at: None,
        close_price: None,
        close_time: None,
        profit_loss: None,
        error: None,
        created_at: Utc::now(),
    }
}

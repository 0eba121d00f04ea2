use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::*;
use crate::broker::{
    AccountInfo, BrokerApi, BrokerConnector, BrokerResult, ClosedPosition, DealRecord,
    LimitOrderRequest, MarketOrderRequest, ModifiedPosition, OpenPosition, OrderFill,
    OrderPlacement, Quote,
};
use crate::models::{Extraction, ExtractionMethod, MessageCategory, SignalStatus};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[derive(Default)]
struct MockBroker {
    quote: Mutex<Option<Quote>>,
    fail_market: AtomicBool,
    fail_limit: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MockBroker {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn set_quote(&self, quote: Quote) {
        *self.quote.lock().unwrap() = Some(quote);
    }
}

#[async_trait]
impl BrokerApi for Arc<MockBroker> {
    async fn connect(&self, _login: i64, _password: &str, _server: &str) -> BrokerResult<()> {
        self.calls.lock().unwrap().push("connect".into());
        Ok(())
    }

    async fn disconnect(&self) {}

    async fn market_order(&self, request: MarketOrderRequest) -> BrokerResult<OrderFill> {
        self.calls.lock().unwrap().push("market_order".into());
        if self.fail_market.load(Ordering::SeqCst) {
            return Err(crate::error::DomainError::broker("Requote", Some(10004)));
        }
        let entry = self
            .quote
            .lock()
            .unwrap()
            .as_ref()
            .map(|q| match request.side {
                Side::Buy => q.ask,
                Side::Sell => q.bid,
            })
            .unwrap_or(dec("1.0"));
        Ok(OrderFill {
            ticket: 700100,
            entry_price: entry,
            executed_at: Utc::now(),
        })
    }

    async fn limit_order(&self, _request: LimitOrderRequest) -> BrokerResult<OrderPlacement> {
        self.calls.lock().unwrap().push("limit_order".into());
        if self.fail_limit.load(Ordering::SeqCst) {
            return Err(crate::error::DomainError::broker("Invalid price", Some(10015)));
        }
        Ok(OrderPlacement {
            ticket: 700200,
            placed_at: Utc::now(),
        })
    }

    async fn close_position(&self, _symbol: &str, _ticket: i64) -> BrokerResult<ClosedPosition> {
        self.calls.lock().unwrap().push("close_position".into());
        Ok(ClosedPosition {
            close_price: dec("1.1230"),
            profit_loss: Some(dec("42.5")),
            closed_at: Utc::now(),
        })
    }

    async fn modify_position(
        &self,
        ticket: i64,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> BrokerResult<ModifiedPosition> {
        self.calls.lock().unwrap().push("modify_position".into());
        Ok(ModifiedPosition {
            ticket,
            stop_loss,
            take_profit,
        })
    }

    async fn quote(&self, _symbol: &str) -> Option<Quote> {
        self.quote.lock().unwrap().clone()
    }

    async fn list_positions(&self, _symbol: Option<&str>) -> Vec<OpenPosition> {
        vec![]
    }

    async fn history_deal(&self, _ticket: i64) -> Option<DealRecord> {
        None
    }

    async fn account_info(&self) -> BrokerResult<AccountInfo> {
        Ok(AccountInfo {
            login: 101,
            server: "Broker-Demo".into(),
            balance: dec("10000"),
            equity: dec("10000"),
            profit: Decimal::ZERO,
            margin: Decimal::ZERO,
            margin_free: dec("10000"),
            margin_level: Decimal::ZERO,
        })
    }
}

struct MockConnector {
    broker: Arc<MockBroker>,
}

impl BrokerConnector for MockConnector {
    fn create(&self) -> Arc<dyn BrokerApi> {
        Arc::new(self.broker.clone())
    }
}

struct Harness {
    db: Arc<Database>,
    engine: ExecutionEngine,
    hub: Arc<NotificationHub>,
    broker: Arc<MockBroker>,
    user_id: Uuid,
    broker_account_id: Uuid,
    channel_id: Uuid,
}

const MASTER_KEY: &str = "unit-test-master-key-0123456789abcdef";

async fn harness(manual_approval: bool) -> Harness {
    let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
    let hub = Arc::new(NotificationHub::new());
    let vault = Arc::new(CredentialVault::new(MASTER_KEY).unwrap());
    let broker = Arc::new(MockBroker::default());
    let gateway = Arc::new(BrokerGateway::new(Arc::new(MockConnector {
        broker: broker.clone(),
    })));

    let user = db
        .create_user("engine@example.com", "engine-user", "$2b$12$hash")
        .await
        .unwrap();
    let account = db
        .create_broker_account(user.id, "Demo", 101, "Broker-Demo")
        .await
        .unwrap();
    let channel = db.create_channel(user.id, -100200300, "Signals").await.unwrap();

    vault
        .store(&db, user.id, Some(account.id), "broker_password", "pw")
        .await
        .unwrap();

    let mut prefs = crate::models::Preferences::defaults_for(user.id);
    prefs.manual_approval = manual_approval;
    prefs.use_limit_orders = false;
    db.save_preferences(&prefs).await.unwrap();

    let engine = ExecutionEngine::new(db.clone(), gateway, vault, hub.clone());

    Harness {
        db,
        engine,
        hub,
        broker,
        user_id: user.id,
        broker_account_id: account.id,
        channel_id: channel.id,
    }
}

fn extraction(take_profits: &[&str]) -> Extraction {
    Extraction {
        category: MessageCategory::ActionableSignal,
        modification_type: None,
        side: Some(Side::Buy),
        symbol: Some("EURUSD".to_string()),
        entry: Some(dec("1.1000")),
        entry_range: None,
        stop_loss: Some(dec("1.0950")),
        take_profit: take_profits.first().map(|s| dec(s)),
        take_profits: take_profits.iter().map(|s| dec(s)).collect(),
        confidence: 0.9,
        method: ExtractionMethod::Heuristic,
    }
}

async fn seed_signal(harness: &Harness, extracted: Extraction) -> Signal {
    let signal = Signal {
        id: Uuid::new_v4(),
        user_id: harness.user_id,
        channel_id: harness.channel_id,
        raw_text: "test".to_string(),
        category: extracted.category,
        modification_type: None,
        actionable: true,
        status: SignalStatus::Pending,
        received_at: Utc::now(),
        processed_at: None,
        extracted,
    };
    harness
        .db
        .record_signal(&signal, "signal_received", serde_json::json!({}))
        .await
        .unwrap();
    signal
}

fn default_quote() -> Quote {
    Quote {
        bid: dec("1.0999"),
        ask: dec("1.1001"),
        point: dec("0.0001"),
        digits: 4,
        spread: 2,
        filling_mode: 1,
    }
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_fan_out_one_execution_per_take_profit() {
    let h = harness(false).await;
    h.broker.set_quote(default_quote());

    let tps = ["1.1100", "1.1150", "1.1200", "1.1250", "1.1300", "1.1350", "1.1400"];
    let signal = seed_signal(&h, extraction(&tps)).await;

    let outcome = h
        .engine
        .execute_signal(&signal, h.broker_account_id)
        .await
        .unwrap();

    let ExecutionOutcome::Completed { results } = outcome else {
        panic!("expected completed outcome");
    };
    assert_eq!(results.len(), 7);
    assert!(results.iter().all(|r| r.success));

    // risk 1.0 split 7 ways, rounded to lot precision
    let executions = h.db.executions_for_signal(signal.id).await.unwrap();
    assert_eq!(executions.len(), 7);
    assert!(executions.iter().all(|e| e.volume == dec("0.14")));
}

#[tokio::test]
async fn test_fan_out_without_targets_creates_one_execution() {
    let h = harness(false).await;
    h.broker.set_quote(default_quote());

    let mut extracted = extraction(&[]);
    extracted.take_profit = None;
    let signal = seed_signal(&h, extracted).await;

    h.engine
        .execute_signal(&signal, h.broker_account_id)
        .await
        .unwrap();

    let executions = h.db.executions_for_signal(signal.id).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert!(executions[0].take_profit.is_none());
    assert_eq!(executions[0].volume, dec("1.00"));
}

#[tokio::test]
async fn test_volume_clamped_at_minimum_lot() {
    let h = harness(false).await;
    h.broker.set_quote(default_quote());

    let mut prefs = h.db.get_preferences(h.user_id).await.unwrap();
    prefs.risk_per_trade = dec("0.01");
    h.db.save_preferences(&prefs).await.unwrap();

    let signal = seed_signal(&h, extraction(&["1.1100", "1.1150", "1.1200"])).await;
    h.engine
        .execute_signal(&signal, h.broker_account_id)
        .await
        .unwrap();

    let executions = h.db.executions_for_signal(signal.id).await.unwrap();
    assert!(executions.iter().all(|e| e.volume == dec("0.01")));
}

#[tokio::test]
async fn test_approval_gate_defers_broker_contact() {
    let h = harness(true).await;
    let (_, mut rx) = h.hub.attach(h.user_id);

    let signal = seed_signal(&h, extraction(&["1.1100", "1.1150"])).await;
    let outcome = h
        .engine
        .execute_signal(&signal, h.broker_account_id)
        .await
        .unwrap();

    let ExecutionOutcome::PendingApproval { execution_ids } = outcome else {
        panic!("expected pending approval");
    };
    assert_eq!(execution_ids.len(), 2);

    // the broker was never touched
    assert!(h.broker.calls().is_empty());

    let events = drain(&mut rx);
    let approvals: Vec<_> = events
        .iter()
        .filter(|e| e.contains("\"type\":\"signal_approval_required\""))
        .collect();
    assert_eq!(approvals.len(), 2);

    for id in execution_ids {
        let execution = h.db.get_execution(id).await.unwrap().unwrap();
        assert_eq!(execution.state, ExecutionState::PendingApproval);
    }
}

#[tokio::test]
async fn test_confirm_resumes_single_execution() {
    let h = harness(true).await;
    h.broker.set_quote(default_quote());

    let signal = seed_signal(&h, extraction(&["1.1100", "1.1150"])).await;
    let outcome = h
        .engine
        .execute_signal(&signal, h.broker_account_id)
        .await
        .unwrap();
    let ExecutionOutcome::PendingApproval { execution_ids } = outcome else {
        panic!("expected pending approval");
    };

    let result = h.engine.confirm(execution_ids[0], None, None).await.unwrap();
    assert!(result.success);
    assert!(result.ticket.is_some());

    let confirmed = h.db.get_execution(execution_ids[0]).await.unwrap().unwrap();
    assert_eq!(confirmed.state, ExecutionState::Executed);
    assert!(confirmed.actual_entry_price.is_some());

    // the sibling stays parked and the signal stays pending
    let sibling = h.db.get_execution(execution_ids[1]).await.unwrap().unwrap();
    assert_eq!(sibling.state, ExecutionState::PendingApproval);
    let signal = h.db.get_signal(signal.id).await.unwrap().unwrap();
    assert_eq!(signal.status, SignalStatus::Pending);
}

#[tokio::test]
async fn test_confirm_applies_overrides() {
    let h = harness(true).await;
    h.broker.set_quote(default_quote());

    let signal = seed_signal(&h, extraction(&["1.1100"])).await;
    let ExecutionOutcome::PendingApproval { execution_ids } = h
        .engine
        .execute_signal(&signal, h.broker_account_id)
        .await
        .unwrap()
    else {
        panic!("expected pending approval");
    };

    h.engine
        .confirm(execution_ids[0], Some(dec("1.0900")), Some(dec("1.1500")))
        .await
        .unwrap();

    let execution = h.db.get_execution(execution_ids[0]).await.unwrap().unwrap();
    assert_eq!(execution.stop_loss, Some(dec("1.0900")));
    assert_eq!(execution.take_profit, Some(dec("1.1500")));
}

#[tokio::test]
async fn test_cancel_all_rejects_signal() {
    let h = harness(true).await;
    let (_, mut rx) = h.hub.attach(h.user_id);

    let signal = seed_signal(&h, extraction(&["1.1100", "1.1150"])).await;
    let ExecutionOutcome::PendingApproval { execution_ids } = h
        .engine
        .execute_signal(&signal, h.broker_account_id)
        .await
        .unwrap()
    else {
        panic!("expected pending approval");
    };

    for id in &execution_ids {
        h.engine.cancel(*id).await.unwrap();
    }

    for id in &execution_ids {
        let execution = h.db.get_execution(*id).await.unwrap().unwrap();
        assert_eq!(execution.state, ExecutionState::Cancelled);
    }

    let signal = h.db.get_signal(signal.id).await.unwrap().unwrap();
    assert_eq!(signal.status, SignalStatus::Rejected);

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| e.contains("\"type\":\"signal_update\"") && e.contains("rejected")));
}

#[tokio::test]
async fn test_cancel_rejected_outside_pending_approval() {
    let h = harness(false).await;
    h.broker.set_quote(default_quote());

    let signal = seed_signal(&h, extraction(&["1.1100"])).await;
    let ExecutionOutcome::Completed { results } = h
        .engine
        .execute_signal(&signal, h.broker_account_id)
        .await
        .unwrap()
    else {
        panic!("expected completed");
    };

    let err = h.engine.cancel(results[0].execution_id).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[tokio::test]
async fn test_orientation_violation_fails_without_broker_call() {
    let h = harness(false).await;
    h.broker.set_quote(default_quote());

    // buy with SL above entry and TP below: rejected before any order
    let mut extracted = extraction(&["1.0900"]);
    extracted.stop_loss = Some(dec("1.1100"));
    let signal = seed_signal(&h, extracted).await;

    let ExecutionOutcome::Completed { results } = h
        .engine
        .execute_signal(&signal, h.broker_account_id)
        .await
        .unwrap()
    else {
        panic!("expected completed");
    };

    assert!(!results[0].success);
    let error = results[0].error.as_deref().unwrap();
    assert!(error.contains("invalid price levels"), "{}", error);

    let execution = h.db.get_execution(results[0].execution_id).await.unwrap().unwrap();
    assert_eq!(execution.state, ExecutionState::Failed);

    assert!(h
        .broker
        .calls()
        .iter()
        .all(|c| c != "market_order" && c != "limit_order"));
}

#[tokio::test]
async fn test_low_confidence_rejected_before_fan_out() {
    let h = harness(false).await;

    let mut extracted = extraction(&["1.1100"]);
    extracted.confidence = 0.3;
    let signal = seed_signal(&h, extracted).await;

    let err = h
        .engine
        .execute_signal(&signal, h.broker_account_id)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
    assert!(h
        .db
        .executions_for_signal(signal.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_market_to_limit_fallback_event_sequence() {
    let h = harness(false).await;
    h.broker.set_quote(default_quote());
    h.broker.fail_market.store(true, Ordering::SeqCst);

    let (_, mut rx) = h.hub.attach(h.user_id);

    let signal = seed_signal(&h, extraction(&["1.1100"])).await;
    let ExecutionOutcome::Completed { results } = h
        .engine
        .execute_signal(&signal, h.broker_account_id)
        .await
        .unwrap()
    else {
        panic!("expected completed");
    };

    assert!(results[0].success);
    assert_eq!(results[0].ticket, Some(700200));

    // the fallback rests at the planned entry
    let execution = h.db.get_execution(results[0].execution_id).await.unwrap().unwrap();
    assert_eq!(execution.state, ExecutionState::Executed);
    assert_eq!(execution.actual_entry_price, Some(dec("1.1000")));

    let calls = h.broker.calls();
    let order_calls: Vec<&str> = calls
        .iter()
        .map(|c| c.as_str())
        .filter(|c| *c == "market_order" || *c == "limit_order")
        .collect();
    assert_eq!(order_calls, ["market_order", "limit_order"]);

    // broadcast sequence: executing, falling_back, executed
    let events = drain(&mut rx);
    let phases: Vec<&str> = events
        .iter()
        .filter(|e| e.contains("\"type\":\"execution_update\""))
        .filter_map(|e| {
            if e.contains("falling_back") {
                Some("falling_back")
            } else if e.contains("executed") {
                Some("executed")
            } else if e.contains("executing") {
                Some("executing")
            } else {
                None
            }
        })
        .collect();
    assert_eq!(phases, ["executing", "falling_back", "executed"]);

    let signal = h.db.get_signal(signal.id).await.unwrap().unwrap();
    assert_eq!(signal.status, SignalStatus::Processed);
}

#[tokio::test]
async fn test_failed_market_without_entry_is_not_retried() {
    let h = harness(false).await;
    h.broker.set_quote(default_quote());
    h.broker.fail_market.store(true, Ordering::SeqCst);

    let mut extracted = extraction(&["1.1100"]);
    extracted.entry = None;
    let signal = seed_signal(&h, extracted).await;

    let ExecutionOutcome::Completed { results } = h
        .engine
        .execute_signal(&signal, h.broker_account_id)
        .await
        .unwrap()
    else {
        panic!("expected completed");
    };

    assert!(!results[0].success);
    let calls = h.broker.calls();
    assert!(calls.iter().any(|c| c == "market_order"));
    assert!(!calls.iter().any(|c| c == "limit_order"));

    let execution = h.db.get_execution(results[0].execution_id).await.unwrap().unwrap();
    assert_eq!(execution.state, ExecutionState::Failed);
}

#[tokio::test]
async fn test_failed_limit_fallback_fails_execution() {
    let h = harness(false).await;
    h.broker.set_quote(default_quote());
    h.broker.fail_market.store(true, Ordering::SeqCst);
    h.broker.fail_limit.store(true, Ordering::SeqCst);

    let signal = seed_signal(&h, extraction(&["1.1100"])).await;
    let ExecutionOutcome::Completed { results } = h
        .engine
        .execute_signal(&signal, h.broker_account_id)
        .await
        .unwrap()
    else {
        panic!("expected completed");
    };

    assert!(!results[0].success);
    let execution = h.db.get_execution(results[0].execution_id).await.unwrap().unwrap();
    assert_eq!(execution.state, ExecutionState::Failed);
    assert!(execution.error.is_some());
}

#[tokio::test]
async fn test_confirm_allowed_from_failed() {
    let h = harness(false).await;
    h.broker.set_quote(default_quote());
    h.broker.fail_market.store(true, Ordering::SeqCst);
    h.broker.fail_limit.store(true, Ordering::SeqCst);

    let signal = seed_signal(&h, extraction(&["1.1100"])).await;
    let ExecutionOutcome::Completed { results } = h
        .engine
        .execute_signal(&signal, h.broker_account_id)
        .await
        .unwrap()
    else {
        panic!("expected completed");
    };
    assert!(!results[0].success);

    // broker recovers; replay from validation succeeds
    h.broker.fail_market.store(false, Ordering::SeqCst);
    h.broker.fail_limit.store(false, Ordering::SeqCst);

    let result = h
        .engine
        .confirm(results[0].execution_id, None, None)
        .await
        .unwrap();
    assert!(result.success);

    let execution = h.db.get_execution(results[0].execution_id).await.unwrap().unwrap();
    assert_eq!(execution.state, ExecutionState::Executed);
}

#[tokio::test]
async fn test_executed_invariant_ticket_and_entry_present() {
    let h = harness(false).await;
    h.broker.set_quote(default_quote());

    let signal = seed_signal(&h, extraction(&["1.1100", "1.1200"])).await;
    h.engine
        .execute_signal(&signal, h.broker_account_id)
        .await
        .unwrap();

    for execution in h.db.executions_for_signal(signal.id).await.unwrap() {
        assert_eq!(execution.state, ExecutionState::Executed);
        assert!(execution.ticket.is_some());
        assert!(execution.actual_entry_price.is_some());
    }
}

#[tokio::test]
async fn test_close_open_position() {
    let h = harness(false).await;
    h.broker.set_quote(default_quote());

    let signal = seed_signal(&h, extraction(&["1.1100"])).await;
    let ExecutionOutcome::Completed { results } = h
        .engine
        .execute_signal(&signal, h.broker_account_id)
        .await
        .unwrap()
    else {
        panic!("expected completed");
    };

    let closed = h.engine.close(results[0].execution_id).await.unwrap();
    assert_eq!(closed.state, ExecutionState::Closed);
    assert_eq!(closed.close_price, Some(dec("1.1230")));
    assert_eq!(closed.profit_loss, Some(dec("42.5")));
}

use super::*;
use chrono::Utc;

#[tokio::test]
async fn test_insert_and_round_trip() {
    let db = test_db().await;
    let user = seed_user(&db).await;
    let channel = seed_channel(&db, user.id).await;
    let broker = Uuid::new_v4();

    let signal = make_signal(user.id, channel.id);
    db.record_signal(&signal, "signal_received", serde_json::json!({}))
        .await
        .unwrap();

    let execution = make_execution(user.id, signal.id, broker, ExecutionState::Pending);
    db.insert_execution(&execution).await.unwrap();

    let fetched = db.get_execution(execution.id).await.unwrap().unwrap();
    assert_eq!(fetched.symbol, "EURUSD");
    assert_eq!(fetched.side, Side::Buy);
    assert_eq!(fetched.volume, dec("0.1"));
    assert_eq!(fetched.entry_price, Some(dec("1.1000")));
    assert_eq!(fetched.state, ExecutionState::Pending);
    assert!(fetched.ticket.is_none());
}

#[tokio::test]
async fn test_transition_cas_guards_state() {
    let db = test_db().await;
    let user = seed_user(&db).await;
    let channel = seed_channel(&db, user.id).await;
    let broker = Uuid::new_v4();

    let signal = make_signal(user.id, channel.id);
    db.record_signal(&signal, "signal_received", serde_json::json!({}))
        .await
        .unwrap();

    let execution = make_execution(user.id, signal.id, broker, ExecutionState::Pending);
    db.insert_execution(&execution).await.unwrap();

    assert!(db
        .transition_execution(execution.id, ExecutionState::Pending, ExecutionState::Validated)
        .await
        .unwrap());

    // stale transition from the old state is rejected
    assert!(!db
        .transition_execution(execution.id, ExecutionState::Pending, ExecutionState::Validated)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_executed_bookkeeping_requires_executing() {
    let db = test_db().await;
    let user = seed_user(&db).await;
    let channel = seed_channel(&db, user.id).await;
    let broker = Uuid::new_v4();

    let signal = make_signal(user.id, channel.id);
    db.record_signal(&signal, "signal_received", serde_json::json!({}))
        .await
        .unwrap();

    let execution = make_execution(user.id, signal.id, broker, ExecutionState::Executing);
    db.insert_execution(&execution).await.unwrap();

    assert!(db
        .mark_execution_executed(execution.id, 778899, dec("1.1002"), Utc::now())
        .await
        .unwrap());

    let fetched = db.get_execution(execution.id).await.unwrap().unwrap();
    assert_eq!(fetched.state, ExecutionState::Executed);
    assert_eq!(fetched.ticket, Some(778899));
    assert_eq!(fetched.actual_entry_price, Some(dec("1.1002")));
    assert!(fetched.executed_at.is_some());

    // a second completion attempt finds the CAS guard closed
    assert!(!db
        .mark_execution_executed(execution.id, 1, dec("1"), Utc::now())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_close_bookkeeping() {
    let db = test_db().await;
    let user = seed_user(&db).await;
    let channel = seed_channel(&db, user.id).await;
    let broker = Uuid::new_v4();

    let signal = make_signal(user.id, channel.id);
    db.record_signal(&signal, "signal_received", serde_json::json!({}))
        .await
        .unwrap();

    let mut execution = make_execution(user.id, signal.id, broker, ExecutionState::Executed);
    execution.ticket = Some(445566);
    db.insert_execution(&execution).await.unwrap();

    assert!(db
        .mark_execution_closed(execution.id, dec("1.1230"), Some(dec("42.5")), Utc::now())
        .await
        .unwrap());

    let fetched = db.get_execution(execution.id).await.unwrap().unwrap();
    assert_eq!(fetched.state, ExecutionState::Closed);
    assert_eq!(fetched.close_price, Some(dec("1.1230")));
    assert_eq!(fetched.profit_loss, Some(dec("42.5")));

    // closed is terminal
    assert!(!db
        .mark_execution_closed(execution.id, dec("1"), None, Utc::now())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_profit_refresh_only_touches_executed() {
    let db = test_db().await;
    let user = seed_user(&db).await;
    let channel = seed_channel(&db, user.id).await;
    let broker = Uuid::new_v4();

    let signal = make_signal(user.id, channel.id);
    db.record_signal(&signal, "signal_received", serde_json::json!({}))
        .await
        .unwrap();

    let open = make_execution(user.id, signal.id, broker, ExecutionState::Executed);
    let closed = make_execution(user.id, signal.id, broker, ExecutionState::Closed);
    db.insert_execution(&open).await.unwrap();
    db.insert_execution(&closed).await.unwrap();

    db.update_execution_profit(open.id, dec("12.3")).await.unwrap();
    db.update_execution_profit(closed.id, dec("99.9")).await.unwrap();

    assert_eq!(
        db.get_execution(open.id).await.unwrap().unwrap().profit_loss,
        Some(dec("12.3"))
    );
    assert_eq!(
        db.get_execution(closed.id).await.unwrap().unwrap().profit_loss,
        None
    );
}

#[tokio::test]
async fn test_executions_in_state() {
    let db = test_db().await;
    let user = seed_user(&db).await;
    let channel = seed_channel(&db, user.id).await;
    let broker = Uuid::new_v4();

    let signal = make_signal(user.id, channel.id);
    db.record_signal(&signal, "signal_received", serde_json::json!({}))
        .await
        .unwrap();

    for state in [
        ExecutionState::Executed,
        ExecutionState::Executed,
        ExecutionState::Failed,
    ] {
        db.insert_execution(&make_execution(user.id, signal.id, broker, state))
            .await
            .unwrap();
    }

    let executed = db
        .executions_in_state(ExecutionState::Executed)
        .await
        .unwrap();
    assert_eq!(executed.len(), 2);
}

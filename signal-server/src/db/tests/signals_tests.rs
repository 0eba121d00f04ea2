use super::*;
use serde_json::json;

#[tokio::test]
async fn test_record_and_fetch_signal() {
    let db = test_db().await;
    let user = seed_user(&db).await;
    let channel = seed_channel(&db, user.id).await;

    let signal = make_signal(user.id, channel.id);
    db.record_signal(&signal, "signal_received", json!({"channel": channel.label}))
        .await
        .unwrap();

    let fetched = db.get_signal(signal.id).await.unwrap().expect("signal row");
    assert_eq!(fetched.raw_text, signal.raw_text);
    assert_eq!(fetched.status, SignalStatus::Pending);
    assert_eq!(fetched.category, MessageCategory::ActionableSignal);
    assert_eq!(fetched.extracted.entry, Some(dec("1.1000")));

    // the audit entry landed in the same transaction
    let audit = db.list_audit_events(user.id, 10).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "signal_received");
    assert_eq!(audit[0].resource_id, Some(signal.id));
}

#[tokio::test]
async fn test_refresh_status_all_cancelled_rejects() {
    let db = test_db().await;
    let user = seed_user(&db).await;
    let channel = seed_channel(&db, user.id).await;
    let broker = Uuid::new_v4();

    let signal = make_signal(user.id, channel.id);
    db.record_signal(&signal, "signal_received", json!({}))
        .await
        .unwrap();

    for _ in 0..3 {
        let execution = make_execution(user.id, signal.id, broker, ExecutionState::Cancelled);
        db.insert_execution(&execution).await.unwrap();
    }

    let status = db.refresh_signal_status(signal.id).await.unwrap();
    assert_eq!(status, Some(SignalStatus::Rejected));

    let fetched = db.get_signal(signal.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, SignalStatus::Rejected);
    assert!(fetched.processed_at.is_some());
}

#[tokio::test]
async fn test_refresh_status_with_fill_processes() {
    let db = test_db().await;
    let user = seed_user(&db).await;
    let channel = seed_channel(&db, user.id).await;
    let broker = Uuid::new_v4();

    let signal = make_signal(user.id, channel.id);
    db.record_signal(&signal, "signal_received", json!({}))
        .await
        .unwrap();

    let executed = make_execution(user.id, signal.id, broker, ExecutionState::Executed);
    let cancelled = make_execution(user.id, signal.id, broker, ExecutionState::Cancelled);
    db.insert_execution(&executed).await.unwrap();
    db.insert_execution(&cancelled).await.unwrap();

    let status = db.refresh_signal_status(signal.id).await.unwrap();
    assert_eq!(status, Some(SignalStatus::Processed));
}

#[tokio::test]
async fn test_refresh_status_waits_for_open_executions() {
    let db = test_db().await;
    let user = seed_user(&db).await;
    let channel = seed_channel(&db, user.id).await;
    let broker = Uuid::new_v4();

    let signal = make_signal(user.id, channel.id);
    db.record_signal(&signal, "signal_received", json!({}))
        .await
        .unwrap();

    let executed = make_execution(user.id, signal.id, broker, ExecutionState::Executed);
    let still_open = make_execution(user.id, signal.id, broker, ExecutionState::PendingApproval);
    db.insert_execution(&executed).await.unwrap();
    db.insert_execution(&still_open).await.unwrap();

    let status = db.refresh_signal_status(signal.id).await.unwrap();
    assert_eq!(status, None);

    let fetched = db.get_signal(signal.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, SignalStatus::Pending);
}

#[tokio::test]
async fn test_refresh_status_is_monotone() {
    let db = test_db().await;
    let user = seed_user(&db).await;
    let channel = seed_channel(&db, user.id).await;
    let broker = Uuid::new_v4();

    let signal = make_signal(user.id, channel.id);
    db.record_signal(&signal, "signal_received", json!({}))
        .await
        .unwrap();

    let executed = make_execution(user.id, signal.id, broker, ExecutionState::Executed);
    db.insert_execution(&executed).await.unwrap();

    assert_eq!(
        db.refresh_signal_status(signal.id).await.unwrap(),
        Some(SignalStatus::Processed)
    );
    // a second recompute finds the signal already settled
    assert_eq!(db.refresh_signal_status(signal.id).await.unwrap(), None);
}

#[tokio::test]
async fn test_all_failed_signal_stays_pending() {
    let db = test_db().await;
    let user = seed_user(&db).await;
    let channel = seed_channel(&db, user.id).await;
    let broker = Uuid::new_v4();

    let signal = make_signal(user.id, channel.id);
    db.record_signal(&signal, "signal_received", json!({}))
        .await
        .unwrap();

    let failed = make_execution(user.id, signal.id, broker, ExecutionState::Failed);
    db.insert_execution(&failed).await.unwrap();

    assert_eq!(db.refresh_signal_status(signal.id).await.unwrap(), None);
    let fetched = db.get_signal(signal.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, SignalStatus::Pending);
}

#[tokio::test]
async fn test_list_signals_ordering_and_paging() {
    let db = test_db().await;
    let user = seed_user(&db).await;
    let channel = seed_channel(&db, user.id).await;

    for _ in 0..5 {
        let signal = make_signal(user.id, channel.id);
        db.record_signal(&signal, "signal_received", json!({}))
            .await
            .unwrap();
    }

    let first_page = db.list_signals(user.id, 3, 0).await.unwrap();
    assert_eq!(first_page.len(), 3);
    let second_page = db.list_signals(user.id, 3, 3).await.unwrap();
    assert_eq!(second_page.len(), 2);
}

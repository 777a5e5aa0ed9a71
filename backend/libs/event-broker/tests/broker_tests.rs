/// Integration tests for the event broker
/// This test module covers:
/// - Per-topic publish order under interleaved publishes
/// - Disconnect and unsubscribe cleanup
/// - Overflow backpressure
/// - Session expiry
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crypto_core::testing::{principal, principal_expiring_at, token_for, verifier};
use crypto_core::Role;
use event_broker::{BrokerConfig, CloseReason, DomainEvent, EventBroker, Topic};
use futures::StreamExt;
use serde_json::json;

fn event(kind: &str, n: u64) -> DomainEvent {
    DomainEvent::new(kind, json!({ "n": n }))
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_events_arrive_in_publish_order_despite_other_topics() {
    let broker = EventBroker::default();
    let mut session = broker.subscribe(principal("u1", Role::User), "tasks").unwrap();

    for n in 0..50 {
        broker.publish("tasks", event("taskAdded", n));
        broker.publish("comments", event("commentAdded", n));
        broker.publish("audit", event("noise", n));
    }

    for expected in 0..50 {
        let received = session.recv().await.unwrap();
        assert_eq!(received.topic, Topic::new("tasks"));
        assert_eq!(received.payload["n"], expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishers_produce_one_global_order() {
    let broker = EventBroker::default();
    let mut first = broker.subscribe(principal("u1", Role::User), "tasks").unwrap();
    let mut second = broker.subscribe(principal("u2", Role::User), "tasks").unwrap();

    let publishers: Vec<_> = (0..4)
        .map(|p| {
            let broker = broker.clone();
            tokio::spawn(async move {
                for n in 0..25 {
                    broker.publish("tasks", event("taskAdded", p * 100 + n));
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for publisher in publishers {
        publisher.await.unwrap();
    }

    let mut seen_first = Vec::new();
    let mut seen_second = Vec::new();
    for _ in 0..100 {
        seen_first.push(first.recv().await.unwrap().sequence);
        seen_second.push(second.recv().await.unwrap().sequence);
    }

    assert_eq!(seen_first, seen_second);
    assert!(seen_first.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_one_event_is_shared_between_sessions() {
    let broker = EventBroker::default();
    let mut first = broker.subscribe(principal("u1", Role::User), "tasks").unwrap();
    let mut second = broker.subscribe(principal("u2", Role::User), "tasks").unwrap();

    let report = broker.publish("tasks", event("taskAdded", 1));
    assert_eq!(report.delivered, 2);

    let a = first.recv().await.unwrap();
    let b = second.recv().await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

// ============================================================================
// Disconnects
// ============================================================================

#[tokio::test]
async fn test_dropped_session_is_removed_and_publish_still_succeeds() {
    let broker = EventBroker::default();
    let mut stays = broker.subscribe(principal("u1", Role::User), "tasks").unwrap();
    let leaves = broker.subscribe(principal("u2", Role::User), "tasks").unwrap();

    broker.publish("tasks", event("taskAdded", 1));
    drop(leaves);

    assert_eq!(broker.subscriber_count("tasks"), 1);
    let report = broker.publish("tasks", event("taskAdded", 2));
    assert_eq!(report.delivered, 1);
    assert_eq!(report.disconnected, 0);

    assert_eq!(stays.recv().await.unwrap().payload["n"], 1);
    assert_eq!(stays.recv().await.unwrap().payload["n"], 2);
}

#[tokio::test]
async fn test_close_ends_stream_immediately() {
    let broker = EventBroker::default();
    let mut session = broker
        .subscribe_all(principal("u1", Role::User), ["tasks", "comments"])
        .unwrap();

    broker.publish("tasks", event("taskAdded", 1));
    session.close();

    assert!(session.recv().await.is_none());
    assert_eq!(session.close_reason(), Some(CloseReason::Unsubscribed));
    assert_eq!(broker.subscriber_count("tasks"), 0);
    assert_eq!(broker.subscriber_count("comments"), 0);
}

#[tokio::test]
async fn test_session_does_not_keep_broker_alive() {
    let broker = EventBroker::default();
    let mut session = broker.subscribe(principal("u1", Role::User), "tasks").unwrap();

    drop(broker);

    // No publisher is left, so the stream ends instead of hanging
    assert!(session.recv().await.is_none());
    drop(session);
}

// ============================================================================
// Backpressure
// ============================================================================

#[tokio::test]
async fn test_slow_subscriber_is_disconnected_not_blocking() {
    let broker = EventBroker::new(BrokerConfig {
        channel_capacity: 2,
        enforce_expiry: false,
    });
    let mut slow = broker.subscribe(principal("slow", Role::User), "tasks").unwrap();
    let mut fast = broker.subscribe(principal("fast", Role::User), "tasks").unwrap();

    assert_eq!(broker.publish("tasks", event("taskAdded", 1)).delivered, 2);
    fast.recv().await.unwrap();
    assert_eq!(broker.publish("tasks", event("taskAdded", 2)).delivered, 2);
    fast.recv().await.unwrap();

    let report = broker.publish("tasks", event("taskAdded", 3));
    assert_eq!(report.delivered, 1);
    assert_eq!(report.disconnected, 1);
    assert_eq!(broker.subscriber_count("tasks"), 1);

    // Buffered events drain, then the stream ends
    let drained: Vec<_> = (&mut slow).collect().await;
    assert_eq!(drained.len(), 2);
    assert_eq!(slow.close_reason(), Some(CloseReason::Overflow));

    assert_eq!(fast.recv().await.unwrap().payload["n"], 3);
    assert_eq!(fast.close_reason(), None);
}

// ============================================================================
// Expiry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_session_closes_when_principal_expires() {
    let broker = EventBroker::default();
    let exp = Utc::now().timestamp() + 60;
    let mut session = broker
        .subscribe(principal_expiring_at("u1", Role::User, exp), "tasks")
        .unwrap();

    broker.publish("tasks", event("taskAdded", 1));
    assert!(session.recv().await.is_some());

    tokio::time::advance(Duration::from_secs(61)).await;
    broker.publish("tasks", event("taskAdded", 2));

    assert!(session.recv().await.is_none());
    assert_eq!(session.close_reason(), Some(CloseReason::PrincipalExpired));
    assert_eq!(broker.session_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_expiry_can_be_disabled() {
    let broker = EventBroker::new(BrokerConfig {
        enforce_expiry: false,
        ..BrokerConfig::default()
    });
    let exp = Utc::now().timestamp() + 60;
    let mut session = broker
        .subscribe(principal_expiring_at("u1", Role::User, exp), "tasks")
        .unwrap();

    tokio::time::advance(Duration::from_secs(3600)).await;
    broker.publish("tasks", event("taskAdded", 1));

    assert!(session.recv().await.is_some());
    assert_eq!(session.close_reason(), None);
}

#[tokio::test]
async fn test_far_future_expiry_is_accepted() {
    let broker = EventBroker::default();
    let mut session = broker
        .subscribe(principal_expiring_at("u1", Role::User, i64::MAX), "tasks")
        .unwrap();

    broker.publish("tasks", event("taskAdded", 1));
    assert!(session.recv().await.is_some());
    assert_eq!(session.close_reason(), None);
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn test_admin_token_subscribes_and_receives_exact_payload() {
    let principal = verifier().verify(&token_for("admin-1", Role::Admin)).unwrap();
    let broker = EventBroker::default();
    let mut session = broker.subscribe(principal, "tasks").unwrap();

    let payload = json!({ "id": "t-1", "title": "Write tests", "content": "", "authorId": "admin-1" });
    broker.publish("tasks", DomainEvent::new("taskAdded", payload.clone()));

    let received = session.recv().await.unwrap();
    assert_eq!(received.kind, "taskAdded");
    assert_eq!(received.payload, payload);
    assert_eq!(session.principal().subject_id(), "admin-1");
}

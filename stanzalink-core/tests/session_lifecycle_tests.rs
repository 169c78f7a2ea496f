//! Tests for api::session
//! Connection lifecycle, request scenarios and state callbacks.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{result_for, Completions, Harness};
use stanzalink_core::api::SessionEvent;
use stanzalink_core::network::{ConnectionState, RequestError};

#[tokio::test]
async fn test_connect_reaches_connected_only_after_handshake() {
    let mut h = Harness::new();

    h.session.connect().unwrap();
    h.settle().await;
    assert_eq!(h.session.state(), ConnectionState::Connecting);
    assert_eq!(h.transport.connect_calls(), 1);
    assert_eq!(
        h.transport.last_endpoint().unwrap().to_string(),
        "backend.test:5222"
    );

    h.transport.accept_handshake();
    h.settle().await;
    assert_eq!(h.session.state(), ConnectionState::Connected);
    assert_eq!(h.events(), vec![SessionEvent::ConnectionEstablished]);
}

#[tokio::test]
async fn test_connect_without_credentials_is_noop() {
    let mut h = Harness::new();
    h.session.set_credentials(None).unwrap();
    h.settle().await;

    h.session.connect().unwrap();
    h.settle().await;

    assert_eq!(h.transport.connect_calls(), 0);
    assert_eq!(h.session.state(), ConnectionState::NotConnected);
}

#[tokio::test]
async fn test_second_connect_while_connecting_does_not_reconnect() {
    let mut h = Harness::new();
    h.session.connect().unwrap();
    h.session.connect().unwrap();
    h.settle().await;

    assert_eq!(h.transport.connect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_survives_reconnect() {
    let mut h = Harness::new();
    let completions = Completions::default();
    h.connect().await;

    h.session.enqueue(completions.request("r1", 1)).unwrap();
    h.settle().await;
    assert_eq!(h.sent_ids(), vec!["r1"]);

    h.transport.drop_connection();
    h.settle().await;
    assert_eq!(h.session.state(), ConnectionState::NotConnected);
    assert_eq!(completions.len(), 0);
    assert!(h.events().contains(&SessionEvent::ConnectionLost {
        will_reconnect: true
    }));

    // Reconnect timer fires after the initial 2s delay
    tokio::time::sleep(Duration::from_millis(2_001)).await;
    h.settle().await;
    assert_eq!(h.transport.connect_calls(), 2);

    h.transport.accept_handshake();
    h.settle().await;
    assert_eq!(h.sent_ids(), vec!["r1", "r1"]);

    h.transport.deliver(&result_for("r1"));
    h.settle().await;
    assert_eq!(
        completions.for_id("r1"),
        vec![Ok(serde_json::json!({"ok": true}))]
    );
}

#[tokio::test]
async fn test_enqueue_without_budget_while_disconnected_fails() {
    let mut h = Harness::new();
    let completions = Completions::default();

    h.session.enqueue(completions.request("r0", 0)).unwrap();
    h.settle().await;

    assert_eq!(completions.for_id("r0"), vec![Err(RequestError::NotConnected)]);
    assert!(h.sent_ids().is_empty());
}

#[tokio::test]
async fn test_pending_requests_resent_in_insertion_order() {
    let mut h = Harness::new();
    let completions = Completions::default();

    for id in ["a", "b", "c"] {
        h.session.enqueue(completions.request(id, 1)).unwrap();
    }
    h.settle().await;
    assert!(h.sent_ids().is_empty());

    h.connect().await;
    assert_eq!(h.sent_ids(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_disconnect_immediately_aborts_everything() {
    let mut h = Harness::new();
    let completions = Completions::default();
    h.connect().await;

    h.session.enqueue(completions.request("sent", 3)).unwrap();
    h.settle().await;

    h.session.disconnect_immediately().unwrap();
    h.settle().await;

    assert_eq!(h.session.state(), ConnectionState::NotConnected);
    assert_eq!(completions.for_id("sent"), vec![Err(RequestError::Aborted)]);
    assert!(h.events().contains(&SessionEvent::ConnectionLost {
        will_reconnect: false
    }));

    // A response racing the disconnect is ignored
    h.transport.deliver(&result_for("sent"));
    h.settle().await;
    assert_eq!(completions.len(), 1);
}

#[tokio::test]
async fn test_graceful_disconnect_keeps_requests_with_budget() {
    let mut h = Harness::new();
    let completions = Completions::default();
    h.connect().await;

    h.session.enqueue(completions.request("keep", 1)).unwrap();
    h.session.enqueue(completions.request("drop", 0)).unwrap();
    h.settle().await;

    h.session.disconnect().unwrap();
    h.settle().await;

    assert_eq!(h.session.state(), ConnectionState::NotConnected);
    assert_eq!(completions.for_id("drop"), vec![Err(RequestError::Aborted)]);
    assert!(completions.for_id("keep").is_empty());

    // No automatic reconnect after an explicit disconnect
    assert_eq!(h.transport.connect_calls(), 1);
    h.transport.clear_sent();
    h.connect().await;
    assert_eq!(h.sent_ids(), vec!["keep"]);
}

#[tokio::test]
async fn test_graceful_disconnect_signals_connection_lost() {
    let mut h = Harness::new();
    h.connect().await;

    h.session.disconnect().unwrap();
    h.settle().await;

    assert_eq!(h.session.state(), ConnectionState::NotConnected);
    assert_eq!(
        h.events(),
        vec![
            SessionEvent::ConnectionEstablished,
            SessionEvent::ConnectionLost {
                will_reconnect: false
            },
        ]
    );
}

#[tokio::test]
async fn test_graceful_disconnect_while_connecting_is_silent() {
    let mut h = Harness::new();
    h.session.connect().unwrap();
    h.settle().await;

    h.session.disconnect().unwrap();
    h.settle().await;

    assert_eq!(h.session.state(), ConnectionState::NotConnected);
    assert!(h.events().is_empty());
}

#[tokio::test]
async fn test_execute_when_connected_fires_once() {
    let mut h = Harness::new();
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = fired.clone();
    h.session
        .execute(ConnectionState::Connected, &h.queue, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    h.settle().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    h.connect().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // Consumed: a second connection does not fire it again
    h.session.disconnect_immediately().unwrap();
    h.settle().await;
    h.connect().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // Already connected: fires straight away
    let counter = fired.clone();
    h.session
        .execute(ConnectionState::Connected, &h.queue, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    h.callbacks.run_pending();
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_watch_state_observes_transitions() {
    let mut h = Harness::new();
    let rx = h.session.watch_state();

    h.connect().await;
    assert_eq!(*rx.borrow(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_set_credentials_reconnects() {
    let mut h = Harness::new();
    h.connect().await;

    h.session
        .set_credentials(Some(stanzalink_core::auth::Credentials::new(
            "bob",
            b"other".to_vec(),
        )))
        .unwrap();
    h.settle().await;

    assert_eq!(h.transport.connect_calls(), 2);
    assert_eq!(h.session.state(), ConnectionState::Connecting);

    h.transport.accept_handshake();
    h.settle().await;
    let payload = stanzalink_core::auth::ConnectionPayload::from_bytes(
        h.transport.handshake_payloads().last().unwrap(),
    )
    .unwrap();
    assert_eq!(payload.user_id, "bob");
    assert!(payload.verify(b"other"));
}

#[tokio::test]
async fn test_cancel_request_by_id() {
    let mut h = Harness::new();
    let completions = Completions::default();
    h.connect().await;

    let id = h.session.enqueue(completions.request("c1", 2)).unwrap();
    h.settle().await;
    h.session.cancel(id).unwrap();
    h.settle().await;

    assert_eq!(completions.for_id("c1"), vec![Err(RequestError::Aborted)]);
}

#[tokio::test]
async fn test_shutdown_aborts_and_closes() {
    let mut h = Harness::new();
    let completions = Completions::default();
    h.session.enqueue(completions.request("parked", 1)).unwrap();
    h.settle().await;

    h.session.shutdown().await.unwrap();
    h.callbacks.run_pending();
    assert_eq!(completions.for_id("parked"), vec![Err(RequestError::Aborted)]);

    // Enqueueing on a closed session completes with Aborted too
    assert!(h.session.enqueue(completions.request("late", 1)).is_err());
    h.callbacks.run_pending();
    assert_eq!(completions.for_id("late"), vec![Err(RequestError::Aborted)]);
    assert!(h.session.connect().is_err());
}

#![allow(clippy::unwrap_used)]
// Integration tests for `Session` against the in-process mock server.

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;

use halink_api::mock::{AuthBehavior, MockServer};
use halink_api::{Error, Session, SessionEvent, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

fn session_for(url: Url) -> Session {
    let transport = TransportConfig {
        handshake_timeout: Duration::from_millis(500),
        ..TransportConfig::default()
    };
    let token: SecretString = "secret-token".to_string().into();
    Session::new(url, token, transport).unwrap()
}

async fn connected() -> (MockServer, Session) {
    let server = MockServer::start().await.unwrap();
    let session = session_for(server.url());
    session.connect().await.unwrap();
    (server, session)
}

/// A local URL nothing listens on.
async fn dead_url() -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}")).unwrap()
}

// ── Handshake ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_handshake_success() {
    let (server, session) = connected().await;

    assert!(session.is_connected());
    assert!(session.is_authenticated());
    let auth = server.received_of_type("auth");
    assert_eq!(auth.len(), 1);
    assert_eq!(auth[0]["access_token"], "secret-token");
}

#[tokio::test]
async fn test_auth_invalid_is_terminal() {
    let server = MockServer::start().await.unwrap();
    server.set_auth(AuthBehavior::Reject("Invalid access token".into()));
    let session = session_for(server.url());

    let err = session.connect().await.unwrap_err();
    assert!(err.is_auth_failure(), "got: {err:?}");
    assert!(!err.is_transient());
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let server = MockServer::start().await.unwrap();
    server.set_auth(AuthBehavior::Silent);
    let session = session_for(server.url());

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }), "got: {err:?}");
    assert!(err.is_transient());
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_unreachable_server_is_retryable() {
    let session = session_for(dead_url().await);

    let err = session.connect().await.unwrap_err();
    assert!(err.is_transient(), "got: {err:?}");
    assert!(!err.is_auth_failure());
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_command_results_are_correlated() {
    let (server, session) = connected().await;
    server.respond_with(
        "get_states",
        json!([{ "entity_id": "light.kitchen", "state": "on", "attributes": {} }]),
    );

    let states = session.get_states().await.unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].entity_id, "light.kitchen");
    assert_eq!(session.pending_commands(), 0);

    let sent = server.received_of_type("get_states");
    assert_eq!(sent[0]["id"], 1);
}

#[tokio::test]
async fn test_command_failure_reaches_caller() {
    let (server, session) = connected().await;
    server.fail_with("call_service", "not_found", "Service light.explode not found");

    let err = session
        .call_service("light", "explode", None, Some(json!({ "entity_id": "light.x" })))
        .await
        .unwrap_err();
    match err {
        Error::Command { code, .. } => assert_eq!(code, "not_found"),
        other => panic!("expected Command error, got: {other:?}"),
    }
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_command_on_closed_channel_transmits_nothing() {
    let (server, session) = connected().await;
    session.disconnect();
    let before = server.received().len();

    let err = session.send_command(json!({ "type": "get_states" })).await.unwrap_err();
    assert!(matches!(err, Error::NotConnected), "got: {err:?}");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.received().len(), before);
}

#[tokio::test]
async fn test_disconnect_abandons_pending_commands() {
    let (server, session) = connected().await;
    server.delay_replies(Duration::from_millis(500));

    let waiting = {
        let session = session.clone();
        tokio::spawn(async move { session.send_command(json!({ "type": "get_states" })).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.pending_commands(), 1);

    session.disconnect();
    let result = waiting.await.unwrap();
    assert!(matches!(result, Err(Error::SessionClosed)), "got: {result:?}");
    assert_eq!(session.pending_commands(), 0);
}

#[tokio::test]
async fn test_reconnect_restarts_correlation_ids() {
    let (server, session) = connected().await;
    session.get_states().await.unwrap();
    session.get_states().await.unwrap();

    session.connect().await.unwrap();
    session.get_states().await.unwrap();

    let ids: Vec<_> = server
        .received_of_type("get_states")
        .iter()
        .map(|frame| frame["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 1]);
    assert_eq!(server.connections(), 2);
}

// ── Liveness probe ──────────────────────────────────────────────────

#[tokio::test]
async fn test_ping_answered() {
    let (_server, session) = connected().await;
    assert!(session.ping(Duration::from_millis(500)).await);
    assert_eq!(session.pending_probes(), 0);
}

#[tokio::test]
async fn test_ping_timeout_leaves_no_probe() {
    let (server, session) = connected().await;
    server.answer_pings(false);

    assert!(!session.ping(Duration::from_millis(100)).await);
    assert_eq!(session.pending_probes(), 0);
    // A zombie still looks open locally.
    assert!(session.is_connected());
}

// ── Events ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_trigger_event_is_delivered() {
    let (server, session) = connected().await;
    let mut events = session.take_events().unwrap();
    let subscription = session
        .subscribe_entities(&["light.x".to_string()])
        .await
        .unwrap();

    let sent = server.received_of_type("subscribe_trigger");
    assert_eq!(sent[0]["trigger"]["platform"], "state");
    assert_eq!(sent[0]["trigger"]["entity_id"], json!(["light.x"]));

    server.push_event(
        subscription.id(),
        json!({ "variables": { "trigger": {
            "entity_id": "light.x",
            "to_state": { "state": "on" },
            "from_state": { "state": "off" }
        } } }),
    );

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        SessionEvent::StateChanged(change) => {
            assert_eq!(change.entity_id(), Some("light.x"));
            assert_eq!(change.new_state.unwrap().state, "on");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_no_events_after_disconnect() {
    let (server, session) = connected().await;
    let mut events = session.take_events().unwrap();
    let subscription = session.subscribe_scheduler().await.unwrap();

    session.disconnect();
    server.push_event(subscription.id(), json!({ "event_type": "scheduler_updated" }));

    let next = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap();
    assert!(next.is_none(), "got: {next:?}");
}

#[tokio::test]
async fn test_remote_close_is_reported_once() {
    let (server, session) = connected().await;
    let mut events = session.take_events().unwrap();

    server.close_all();

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, SessionEvent::Closed { .. }), "got: {event:?}");
    assert!(!session.is_connected());

    let err = session.send_command(json!({ "type": "get_states" })).await.unwrap_err();
    assert!(matches!(err, Error::NotConnected));
}

#[tokio::test]
async fn test_subscription_teardown_unsubscribes() {
    let (server, session) = connected().await;
    let subscription = session
        .subscribe_entities(&["switch.pump".to_string()])
        .await
        .unwrap();
    let id = subscription.id();

    subscription.teardown();

    let mut sent = Vec::new();
    for _ in 0..50 {
        sent = server.received_of_type("unsubscribe_events");
        if !sent.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["subscription"], id);
}

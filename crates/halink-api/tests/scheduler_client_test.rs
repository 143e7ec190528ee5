#![allow(clippy::unwrap_used)]
// Integration tests for `SchedulerClient` using wiremock.

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use halink_api::{Error, SchedulerClient, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, SchedulerClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let token: SecretString = "long-lived-token".to_string().into();
    let client = SchedulerClient::new(base_url, token, &TransportConfig::default()).unwrap();
    (server, client)
}

// ── Endpoints ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_add_posts_with_bearer_token() {
    let (server, client) = setup().await;
    let schedule = json!({
        "weekdays": ["daily"],
        "timeslots": [{ "start": "14:05:00", "actions": [{ "service": "input_boolean.turn_on" }] }],
        "repeat_type": "repeat",
        "name": "Washer"
    });

    Mock::given(method("POST"))
        .and(path("/api/scheduler/add"))
        .and(header("authorization", "Bearer long-lived-token"))
        .and(body_json(schedule.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "schedule_id": "abc123" })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client.add(&schedule).await.unwrap();
    assert_eq!(response["schedule_id"], "abc123");
}

#[tokio::test]
async fn test_edit_merges_schedule_id() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/scheduler/edit"))
        .and(body_json(json!({ "schedule_id": "abc123", "name": "Renamed" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client
        .edit("abc123", &json!({ "name": "Renamed" }))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_edit_rejects_non_object_payload() {
    let (_server, client) = setup().await;
    let result = client.edit("abc123", &json!(["nope"])).await;
    assert!(matches!(result, Err(Error::Protocol(_))), "got: {result:?}");
}

#[tokio::test]
async fn test_remove_with_empty_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/scheduler/remove"))
        .and(body_json(json!({ "schedule_id": "abc123" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let response = client.remove("abc123").await.unwrap();
    assert!(response.is_null());
}

// ── Failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_is_auth_failure() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/scheduler/remove"))
        .respond_with(ResponseTemplate::new(401).set_body_string("401: Unauthorized"))
        .mount(&server)
        .await;

    let err = client.remove("abc123").await.unwrap_err();
    assert!(err.is_auth_failure(), "got: {err:?}");
}

#[tokio::test]
async fn test_server_error_carries_status() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/scheduler/add"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    match client.add(&json!({})).await {
        Err(Error::Http { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("expected Http error, got: {other:?}"),
    }
}

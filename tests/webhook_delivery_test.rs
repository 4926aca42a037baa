//! Integration tests for the webhook delivery HTTP step, run against a
//! loopback receiver. No database or store required: these exercise the
//! request/signature/classification half of the delivery state machine.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use ripple::webhooks::delivery::attempt_request;
use ripple::webhooks::signature;

fn payload() -> serde_json::Value {
    serde_json::json!({
        "event_type": "user.created",
        "event_id": "11111111-2222-3333-4444-555555555555",
        "timestamp": "2025-01-01T00:00:00Z",
        "source": "ripple",
        "version": "1.0",
        "data": {"id": 1, "email": "a@b"},
    })
}

#[tokio::test]
async fn delivery_succeeds_on_2xx() {
    let receiver = common::spawn_receiver(200).await;
    let client = reqwest::Client::new();

    let outcome = attempt_request(
        &client,
        &receiver.url(),
        "secret",
        None,
        Duration::from_secs(5),
        "user.created",
        "evt-1",
        &payload(),
    )
    .await;

    assert!(outcome.success);
    assert!(!outcome.retryable);
    assert_eq!(outcome.status_code, Some(200));
    assert!(outcome.error_message.is_none());
}

#[tokio::test]
async fn delivery_headers_and_signature_verify_against_raw_body() {
    let receiver = common::spawn_receiver(200).await;
    let client = reqwest::Client::new();
    let payload = payload();

    let outcome = attempt_request(
        &client,
        &receiver.url(),
        "s3cret",
        None,
        Duration::from_secs(5),
        "user.created",
        "evt-42",
        &payload,
    )
    .await;
    assert!(outcome.success);

    let captured = receiver.captured().await;
    assert_eq!(captured.len(), 1);
    let request = &captured[0];

    assert_eq!(request.header("x-webhook-event"), Some("user.created"));
    assert_eq!(request.header("x-webhook-delivery"), Some("evt-42"));
    assert_eq!(request.header("content-type"), Some("application/json"));

    // The body is the canonical rendering and the signature matches it
    let body: serde_json::Value = request.body_json();
    let received_signature = request.header("x-webhook-signature").expect("signed");
    assert!(signature::verify("s3cret", &body, received_signature));
    assert!(!signature::verify("wrong", &body, received_signature));
    assert_eq!(body["data"]["email"], "a@b");
}

#[tokio::test]
async fn delivery_includes_subscriber_static_headers() {
    let receiver = common::spawn_receiver(200).await;
    let client = reqwest::Client::new();

    let mut static_headers = HashMap::new();
    static_headers.insert("Authorization".to_string(), "Bearer token-7".to_string());

    let outcome = attempt_request(
        &client,
        &receiver.url(),
        "secret",
        Some(&static_headers),
        Duration::from_secs(5),
        "test.ping",
        "evt-h",
        &payload(),
    )
    .await;
    assert!(outcome.success);

    let captured = receiver.captured().await;
    assert_eq!(captured[0].header("authorization"), Some("Bearer token-7"));
}

#[tokio::test]
async fn server_errors_are_retryable() {
    let receiver = common::spawn_receiver(500).await;
    let client = reqwest::Client::new();

    let outcome = attempt_request(
        &client,
        &receiver.url(),
        "secret",
        None,
        Duration::from_secs(5),
        "user.created",
        "evt-5",
        &payload(),
    )
    .await;

    assert!(!outcome.success);
    assert!(outcome.retryable);
    assert_eq!(outcome.status_code, Some(500));
    assert!(outcome.error_message.unwrap().starts_with("HTTP 500"));
}

#[tokio::test]
async fn client_errors_are_permanent() {
    let receiver = common::spawn_receiver(404).await;
    let client = reqwest::Client::new();

    let outcome = attempt_request(
        &client,
        &receiver.url(),
        "secret",
        None,
        Duration::from_secs(5),
        "user.created",
        "evt-4",
        &payload(),
    )
    .await;

    assert!(!outcome.success);
    assert!(!outcome.retryable);
    assert_eq!(outcome.status_code, Some(404));
}

#[tokio::test]
async fn connection_refused_is_retryable() {
    let client = reqwest::Client::new();

    // Nothing listens here; the listener that allocated the port is gone
    let dead_port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let outcome = attempt_request(
        &client,
        &format!("http://127.0.0.1:{dead_port}/hook"),
        "secret",
        None,
        Duration::from_secs(2),
        "user.created",
        "evt-x",
        &payload(),
    )
    .await;

    assert!(!outcome.success);
    assert!(outcome.retryable);
    assert_eq!(outcome.status_code, None);
    assert!(outcome.error_message.is_some());
}

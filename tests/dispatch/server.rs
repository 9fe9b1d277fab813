//! The dispatcher's HTTP surface, driven with reqwest.

use std::sync::Arc;

use serde_json::{json, Value};
use switchboard::envelope::DecodeOptions;
use switchboard::{server, Dispatcher, RouteTable};

use crate::support::{self, GOOD_PASSWORD};

async fn start(decode: DecodeOptions) -> String {
    let auth = support::spawn_auth().await;
    let config = support::config(
        &format!("{auth}/auth"),
        "http://127.0.0.1:1/log",
        "http://127.0.0.1:1/send",
        &support::dead_addr(),
    );
    let dispatcher = Dispatcher::new(RouteTable::from_config(&config, None).unwrap());
    support::spawn_http(server::router(Arc::new(dispatcher), decode)).await
}

async fn post(url: String, body: impl Into<reqwest::Body>) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(url)
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn root_says_hit_the_broker() {
    let base = start(DecodeOptions::default()).await;
    let (status, body) = post(format!("{base}/"), "").await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "error": false, "message": "Hit the broker" }));
}

#[tokio::test]
async fn ping_is_a_dot() {
    let base = start(DecodeOptions::default()).await;
    let resp = reqwest::get(format!("{base}/ping")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), ".");
}

#[tokio::test]
async fn handle_authenticates_end_to_end() {
    let base = start(DecodeOptions::default()).await;
    let request = json!({
        "action": "auth",
        "auth": { "email": "admin@example.com", "password": GOOD_PASSWORD }
    });

    let (status, body) = post(format!("{base}/handle"), request.to_string()).await;
    assert_eq!(status, 202);
    assert_eq!(body["error"], false);
    assert_eq!(body["message"], "Authenticated user admin@example.com");
    assert_eq!(body["data"]["email"], "admin@example.com");
}

#[tokio::test]
async fn handle_rejects_unknown_action() {
    let base = start(DecodeOptions::default()).await;
    let (status, body) = post(format!("{base}/handle"), r#"{"action":"sms"}"#).await;
    assert_eq!(status, 400);
    assert_eq!(body, json!({ "error": true, "message": "unknown action: sms" }));
}

#[tokio::test]
async fn handle_rejects_bad_bodies() {
    let base = start(DecodeOptions::default()).await;

    let (status, body) = post(format!("{base}/handle"), "").await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "body must not be empty");

    let (status, body) = post(
        format!("{base}/handle"),
        r#"{"action":"log"}{"action":"log"}"#,
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "body must only have a single JSON value");

    let (status, body) = post(format!("{base}/handle"), r#"{"action": 7}"#).await;
    assert_eq!(status, 400);
    assert_eq!(
        body["message"],
        "body contains incorrect JSON type for field \"action\""
    );
}

#[tokio::test]
async fn handle_enforces_size_ceiling() {
    let base = start(DecodeOptions::default().with_max_size(64)).await;
    let padding = "x".repeat(100);
    let request = json!({ "action": "log", "log": { "name": "event", "data": padding } });

    let (status, body) = post(format!("{base}/handle"), request.to_string()).await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "body must not be larger than 64 bytes");
}

#[tokio::test]
async fn log_grpc_needs_a_log_payload() {
    let base = start(DecodeOptions::default()).await;
    let (status, body) = post(format!("{base}/log-grpc"), r#"{"action":"log"}"#).await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "missing log payload");
}

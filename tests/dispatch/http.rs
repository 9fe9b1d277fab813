//! HTTP-REST routes: auth and mail.

use axum::http::StatusCode;
use reqwest::Url;
use serde_json::json;
use switchboard::adapter::{Adapter, AdapterError, HttpAdapter};
use switchboard::envelope::{ActionEnvelope, AuthPayload, MailPayload, ResponseEnvelope};
use switchboard::{Dispatcher, RouteTable};

use crate::support::{self, GOOD_PASSWORD};

async fn dispatcher_with_auth() -> Dispatcher {
    let auth = support::spawn_auth().await;
    let (mailer, _) = support::spawn_recorder("/send", StatusCode::ACCEPTED).await;
    let config = support::config(
        &format!("{auth}/auth"),
        "http://127.0.0.1:1/log",
        &mailer,
        &support::dead_addr(),
    );
    Dispatcher::new(RouteTable::from_config(&config, None).unwrap())
}

fn login(email: &str, password: &str) -> ActionEnvelope {
    ActionEnvelope::auth(AuthPayload {
        email: email.into(),
        password: password.into(),
    })
}

#[tokio::test]
async fn auth_success_returns_peer_data() {
    let dispatcher = dispatcher_with_auth().await;

    let out = dispatcher
        .dispatch(&login("admin@example.com", GOOD_PASSWORD))
        .await;

    assert_eq!(out.status, 202);
    assert_eq!(
        out.envelope,
        ResponseEnvelope::success(
            "Authenticated user admin@example.com",
            Some(json!({ "id": 1, "email": "admin@example.com", "active": 1 })),
        )
    );
}

#[tokio::test]
async fn auth_401_is_unauthorized() {
    let dispatcher = dispatcher_with_auth().await;

    let out = dispatcher
        .dispatch(&login("admin@example.com", "wrong"))
        .await;

    assert_eq!(out.status, 401);
    assert_eq!(out.envelope, ResponseEnvelope::failure("invalid credentials"));
}

#[tokio::test]
async fn peer_error_envelope_is_unauthorized_with_peer_message() {
    let dispatcher = dispatcher_with_auth().await;

    let out = dispatcher
        .dispatch(&login("blocked@example.com", GOOD_PASSWORD))
        .await;

    assert_eq!(out.status, 401);
    assert_eq!(out.envelope, ResponseEnvelope::failure("account disabled"));
}

#[tokio::test]
async fn mail_is_posted_and_summarized() {
    let (mailer, recorded) = support::spawn_recorder("/send", StatusCode::ACCEPTED).await;
    let config = support::config(
        "http://127.0.0.1:1/auth",
        "http://127.0.0.1:1/log",
        &mailer,
        &support::dead_addr(),
    );
    let dispatcher = Dispatcher::new(RouteTable::from_config(&config, None).unwrap());

    let mail = MailPayload {
        from: "me@example.com".into(),
        to: "you@example.com".into(),
        subject: "Test mail".into(),
        message: "Hello world!".into(),
    };
    let out = dispatcher.dispatch(&ActionEnvelope::mail(mail)).await;

    assert_eq!(out.status, 202);
    assert_eq!(out.envelope, ResponseEnvelope::success("Message sent to you@example.com", None));
    assert_eq!(
        recorded.all(),
        vec![json!({
            "from": "me@example.com",
            "to": "you@example.com",
            "subject": "Test mail",
            "message": "Hello world!"
        })]
    );
}

#[tokio::test]
async fn unexpected_status_is_upstream_status() {
    let (url, _) = support::spawn_recorder("/send", StatusCode::INTERNAL_SERVER_ERROR).await;
    let adapter = HttpAdapter::new(Url::parse(&url).unwrap());

    let err = adapter.invoke(json!({ "to": "x" })).await.unwrap_err();
    assert_eq!(err, AdapterError::upstream(500));
}

#[tokio::test]
async fn expected_status_is_configurable() {
    let (url, _) = support::spawn_recorder("/log", StatusCode::OK).await;
    let adapter = HttpAdapter::new(Url::parse(&url).unwrap()).expect_status(reqwest::StatusCode::OK);
    assert!(adapter.invoke(json!({ "name": "n", "data": "d" })).await.is_ok());
}

#[tokio::test]
async fn unreachable_mailer_is_500() {
    let config = support::config(
        "http://127.0.0.1:1/auth",
        "http://127.0.0.1:1/log",
        &format!("http://{}/send", support::dead_addr()),
        &support::dead_addr(),
    );
    let dispatcher = Dispatcher::new(RouteTable::from_config(&config, None).unwrap());

    let out = dispatcher
        .dispatch(&ActionEnvelope::mail(MailPayload::default()))
        .await;
    assert_eq!(out.status, 500);
    assert!(out.envelope.error);
    assert!(out.envelope.message.starts_with("could not reach service"));
}

//! The receive loop against a real HTTP logger.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::Value;
use switchboard::adapter::{Adapter, AdapterError, Invocation, Target, TransportKind};
use switchboard::consumer::ConsumerState;
use switchboard::{AckMode, Concurrency, ConsumerOptions, ListenReport};

use crate::support::{listen_while, wire, Harness, MockLogger};

#[tokio::test]
async fn every_published_message_is_forwarded() {
    const N: usize = 50;
    let harness = Harness::new();
    let logger = MockLogger::start(StatusCode::ACCEPTED).await;
    let consumer = harness
        .consumer(logger.adapter(), ConsumerOptions::default())
        .await;

    let bodies: Vec<Vec<u8>> = (0..N).map(|i| wire("log", &format!("entry-{i}"))).collect();
    let report = listen_while(
        &consumer,
        &["log.INFO", "log.WARNING", "log.ERROR"],
        harness.publish("log.INFO", bodies),
        || logger.received().len() >= N,
    )
    .await;

    assert_eq!(report.received, N);
    assert_eq!(report.forwarded, N);
    assert_eq!(report.failed, 0);

    let seen: BTreeSet<String> = logger
        .received()
        .iter()
        .map(|v| v["data"].as_str().unwrap().to_string())
        .collect();
    let expected: BTreeSet<String> = (0..N).map(|i| format!("entry-{i}")).collect();
    assert_eq!(seen, expected);
    assert_eq!(consumer.state(), ConsumerState::Closed);
}

#[tokio::test]
async fn unbound_topics_are_not_received() {
    let harness = Harness::new();
    let logger = MockLogger::start(StatusCode::ACCEPTED).await;
    let consumer = harness
        .consumer(logger.adapter(), ConsumerOptions::default())
        .await;

    let report = listen_while(
        &consumer,
        &["log.ERROR"],
        async {
            harness.publish("log.INFO", vec![wire("log", "skip")]).await;
            harness.publish("log.ERROR", vec![wire("log", "keep")]).await;
        },
        || !logger.received().is_empty(),
    )
    .await;

    assert_eq!(report.received, 1);
    assert_eq!(logger.received()[0]["data"], "keep");
}

#[tokio::test]
async fn auth_messages_are_ignored_and_garbage_dropped() {
    let harness = Harness::new();
    let logger = MockLogger::start(StatusCode::ACCEPTED).await;
    let consumer = harness
        .consumer(logger.adapter(), ConsumerOptions::default())
        .await;

    let report = listen_while(
        &consumer,
        &["#"],
        harness.publish(
            "log.INFO",
            vec![
                wire("auth", "credentials"),
                b"{not json".to_vec(),
                wire("event", "kept"),
            ],
        ),
        || !logger.received().is_empty(),
    )
    .await;

    assert_eq!(
        report,
        ListenReport {
            received: 3,
            forwarded: 1,
            ignored: 1,
            failed: 0,
            dropped: 1,
        }
    );
    assert_eq!(logger.received()[0]["name"], "event");
}

#[tokio::test]
async fn null_fields_are_forwarded_not_dropped() {
    let harness = Harness::new();
    let logger = MockLogger::start(StatusCode::ACCEPTED).await;
    let consumer = harness
        .consumer(logger.adapter(), ConsumerOptions::default())
        .await;

    let report = listen_while(
        &consumer,
        &["#"],
        harness.publish(
            "log.INFO",
            vec![
                br#"{"name":null,"data":"x"}"#.to_vec(),
                br#"{"name":"log","data":null}"#.to_vec(),
            ],
        ),
        || logger.received().len() >= 2,
    )
    .await;

    assert_eq!(report.received, 2);
    assert_eq!(report.forwarded, 2);
    assert_eq!(report.dropped, 0);

    let seen: BTreeSet<(String, String)> = logger
        .received()
        .iter()
        .map(|v| {
            (
                v["name"].as_str().unwrap().to_string(),
                v["data"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        seen,
        BTreeSet::from([
            (String::new(), "x".to_string()),
            ("log".to_string(), String::new()),
        ])
    );
}

#[tokio::test]
async fn auto_ack_loses_failed_messages() {
    let harness = Harness::new();
    let logger = MockLogger::start(StatusCode::INTERNAL_SERVER_ERROR).await;
    let consumer = harness
        .consumer(logger.adapter(), ConsumerOptions::default())
        .await;

    let report = listen_while(
        &consumer,
        &["log.*"],
        harness.publish("log.ERROR", vec![wire("log", "fails")]),
        || !logger.received().is_empty(),
    )
    .await;

    assert_eq!(report.received, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(logger.received().len(), 1);
}

#[tokio::test]
async fn after_handler_mode_redelivers_a_failure_once() {
    let harness = Harness::new();
    let logger = MockLogger::start(StatusCode::INTERNAL_SERVER_ERROR).await;
    let consumer = harness
        .consumer(
            logger.adapter(),
            ConsumerOptions {
                ack_mode: AckMode::AfterHandler,
                concurrency: Concurrency::Unbounded,
            },
        )
        .await;

    let report = listen_while(
        &consumer,
        &["log.*"],
        harness.publish("log.ERROR", vec![wire("log", "retry me")]),
        || logger.received().len() >= 2,
    )
    .await;

    assert_eq!(report.received, 2);
    assert_eq!(report.failed, 2);
}

/// Forwarder that records how many calls overlap.
struct Slow {
    target: Target,
    running: AtomicUsize,
    peak: AtomicUsize,
    done: AtomicUsize,
}

#[async_trait]
impl Adapter for Slow {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn invoke(&self, _: Value) -> Result<Invocation, AdapterError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.done.fetch_add(1, Ordering::SeqCst);
        Ok(Invocation::default())
    }
}

#[tokio::test]
async fn bounded_concurrency_caps_in_flight_handlers() {
    const N: usize = 12;
    let harness = Harness::new();
    let slow = Arc::new(Slow {
        target: Target {
            kind: TransportKind::Http,
            address: "logger-service:8080".into(),
            endpoint: "/log".into(),
            timeout: None,
        },
        running: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
        done: AtomicUsize::new(0),
    });
    let consumer = harness
        .consumer(
            slow.clone(),
            ConsumerOptions {
                ack_mode: AckMode::Auto,
                concurrency: Concurrency::Bounded(3),
            },
        )
        .await;

    let bodies = (0..N).map(|i| wire("log", &i.to_string())).collect();
    let report = listen_while(
        &consumer,
        &["log.*"],
        harness.publish("log.INFO", bodies),
        || slow.done.load(Ordering::SeqCst) >= N,
    )
    .await;

    assert_eq!(report.forwarded, N);
    assert!(slow.peak.load(Ordering::SeqCst) <= 3);
}

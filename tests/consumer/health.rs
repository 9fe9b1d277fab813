//! The listener's `/ping` follows the consumer state.

use axum::http::StatusCode;
use switchboard::consumer::ConsumerState;
use switchboard::{server, ConsumerOptions};

use crate::support::{Harness, MockLogger};

async fn ping(base: &str) -> (u16, String) {
    let resp = reqwest::get(format!("{base}/ping")).await.unwrap();
    (resp.status().as_u16(), resp.text().await.unwrap())
}

#[tokio::test]
async fn ping_is_ok_only_while_subscribed() {
    let harness = Harness::new();
    let logger = MockLogger::start(StatusCode::ACCEPTED).await;
    let consumer = harness
        .consumer(logger.adapter(), ConsumerOptions::default())
        .await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::health_router(consumer.health());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let base = format!("http://{addr}");

    assert_eq!(ping(&base).await, (503, "channel_open".to_string()));

    let topics = vec!["log.*".to_string()];
    let mut health = consumer.health();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let listen = consumer.listen(&topics, async move {
        let _ = stop_rx.await;
    });
    let probe = async {
        health.wait_for(ConsumerState::Subscribed).await;
        let during = ping(&base).await;
        let _ = stop_tx.send(());
        during
    };
    let (report, during) = tokio::join!(listen, probe);
    report.unwrap();

    assert_eq!(during, (200, ".".to_string()));
    assert_eq!(ping(&base).await, (503, "closed".to_string()));
}

//! Async-publish route onto the in-memory topic broker.

use std::sync::Arc;

use futures::StreamExt;
use switchboard::adapter::{TransportKind, WireMessage};
use switchboard::broker::{BrokerConnection, InMemoryBroker, Topology};
use switchboard::envelope::{ActionEnvelope, LogPayload, ResponseEnvelope};
use switchboard::{Config, Dispatcher, RouteTable};

#[tokio::test]
async fn log_action_publishes_to_exchange() {
    let broker = InMemoryBroker::new();
    let publisher: Arc<dyn BrokerConnection> = Arc::new(broker.connect());
    let subscriber = broker.connect();

    let channel = subscriber.create_channel().await.unwrap();
    let (queue, _) = Topology::default()
        .subscribe(channel.as_ref(), &["log.INFO".to_string()])
        .await
        .unwrap();
    let mut deliveries = channel.consume(&queue.name, true).await.unwrap();

    let mut config = Config::default();
    config.routes.log_transport = TransportKind::Publish;
    let dispatcher = Dispatcher::new(RouteTable::from_config(&config, Some(publisher)).unwrap());

    let out = dispatcher
        .dispatch(&ActionEnvelope::log(LogPayload::new("event", "published")))
        .await;

    assert_eq!(out.status, 202);
    assert_eq!(out.envelope, ResponseEnvelope::success("logged via RabbitMQ", None));

    let delivery = deliveries.next().await.unwrap().unwrap();
    assert_eq!(delivery.routing_key, "log.INFO");
    let message: WireMessage = serde_json::from_slice(&delivery.body).unwrap();
    assert_eq!(message.name, "event");
    assert_eq!(message.data, "published");
}

#[tokio::test]
async fn closed_broker_is_500() {
    let broker = InMemoryBroker::new();
    let publisher: Arc<dyn BrokerConnection> = Arc::new(broker.connect());
    publisher.close().await.unwrap();

    let mut config = Config::default();
    config.routes.log_transport = TransportKind::Publish;
    let dispatcher = Dispatcher::new(RouteTable::from_config(&config, Some(publisher)).unwrap());

    let out = dispatcher
        .dispatch(&ActionEnvelope::log(LogPayload::new("event", "lost")))
        .await;
    assert_eq!(out.status, 500);
    assert_eq!(
        out.envelope,
        ResponseEnvelope::failure("could not reach service: connection closed")
    );
}

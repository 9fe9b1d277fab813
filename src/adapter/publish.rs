//! Async-publish adapter: fire a `{name, data}` message onto the topic
//! exchange and return once the broker confirms it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{Adapter, AdapterError, Invocation, Target, TransportKind};
use crate::broker::{BrokerConnection, RoutingKey, Topology};
use crate::envelope::LogPayload;

/// Body of every message on the exchange.
///
/// Missing and null fields both read as the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl From<LogPayload> for WireMessage {
    fn from(payload: LogPayload) -> Self {
        Self {
            name: payload.name,
            data: payload.data,
        }
    }
}

/// Publishes onto the shared exchange over a channel opened per call.
///
/// The connection is the process-wide handle; only the channel is
/// short-lived. The exchange is declared on every call, which the broker
/// treats as a no-op once it exists.
pub struct PublishAdapter {
    target: Target,
    connection: Arc<dyn BrokerConnection>,
    topology: Topology,
}

impl PublishAdapter {
    pub fn new(connection: Arc<dyn BrokerConnection>, topology: Topology) -> Self {
        Self {
            target: Target {
                kind: TransportKind::Publish,
                address: topology.exchange().to_string(),
                endpoint: RoutingKey::default().to_string(),
                timeout: None,
            },
            connection,
            topology,
        }
    }

    /// Routing key for every publish, `"<category>.<severity>"`.
    pub fn with_routing_key(mut self, key: RoutingKey) -> Self {
        self.target.endpoint = key.to_string();
        self
    }

    pub fn routing_key(&self) -> &str {
        &self.target.endpoint
    }

    /// Publish one message and wait for the broker's confirm.
    pub async fn publish(&self, message: &WireMessage) -> Result<(), AdapterError> {
        let body = serde_json::to_vec(message)
            .map_err(|e| AdapterError::DecodeFailed(format!("could not marshal json: {e}")))?;

        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| AdapterError::ConnectFailed(e.to_string()))?;

        let outcome = async {
            self.topology.declare_exchange(channel.as_ref()).await?;
            channel
                .publish(self.topology.exchange(), self.routing_key(), &body)
                .await
        }
        .await;

        if let Err(e) = channel.close().await {
            tracing::debug!(error = %e, "closing publish channel failed");
        }

        outcome.map_err(|e| AdapterError::ConnectFailed(e.to_string()))?;
        tracing::debug!(
            exchange = self.topology.exchange(),
            routing_key = self.routing_key(),
            name = %message.name,
            "message published"
        );
        Ok(())
    }
}

#[async_trait]
impl Adapter for PublishAdapter {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn invoke(&self, payload: Value) -> Result<Invocation, AdapterError> {
        let message: WireMessage = serde_json::from_value(payload)
            .map_err(|e| AdapterError::DecodeFailed(format!("could not marshal payload: {e}")))?;
        self.publish(&message).await?;
        Ok(Invocation::default())
    }
}

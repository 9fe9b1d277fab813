//! The one exchange and the per-consumer queues this system creates.

use super::connection::{BrokerChannel, BrokerError, ExchangeSpec, QueueSpec};

/// Name of the shared topic exchange.
pub const DEFAULT_EXCHANGE: &str = "events.topic";

/// A queue declared by [`Topology::declare_queue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredQueue {
    /// Broker-assigned name.
    pub name: String,
}

/// One `queue ← exchange` binding under a routing-key pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub queue: String,
    pub exchange: String,
    pub pattern: String,
}

/// Declares the durable topic exchange and the transient queues bound to it.
///
/// Every publisher and consumer declares the exchange on startup; identical
/// re-declarations are no-ops on the broker side. Queues are always
/// server-named, non-durable, auto-delete and exclusive, so they vanish with
/// the connection that declared them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    exchange: String,
}

impl Default for Topology {
    fn default() -> Self {
        Self::new(DEFAULT_EXCHANGE)
    }
}

impl Topology {
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn exchange_spec(&self) -> ExchangeSpec {
        ExchangeSpec::topic(self.exchange.clone())
    }

    /// Durable, non-auto-delete, non-internal topic exchange.
    pub async fn declare_exchange(&self, channel: &dyn BrokerChannel) -> Result<(), BrokerError> {
        channel.declare_exchange(&self.exchange_spec()).await
    }

    /// Fresh exclusive queue with a server-assigned name.
    pub async fn declare_queue(
        &self,
        channel: &dyn BrokerChannel,
    ) -> Result<DeclaredQueue, BrokerError> {
        let name = channel.declare_queue(&QueueSpec::exclusive()).await?;
        Ok(DeclaredQueue { name })
    }

    pub async fn bind(
        &self,
        channel: &dyn BrokerChannel,
        queue: &DeclaredQueue,
        pattern: &str,
    ) -> Result<QueueBinding, BrokerError> {
        channel
            .bind_queue(&queue.name, &self.exchange, pattern)
            .await?;
        tracing::debug!(queue = %queue.name, exchange = %self.exchange, pattern, "queue bound");
        Ok(QueueBinding {
            queue: queue.name.clone(),
            exchange: self.exchange.clone(),
            pattern: pattern.to_string(),
        })
    }

    /// Declare the exchange and a fresh queue, then bind it to every pattern.
    pub async fn subscribe(
        &self,
        channel: &dyn BrokerChannel,
        patterns: &[String],
    ) -> Result<(DeclaredQueue, Vec<QueueBinding>), BrokerError> {
        self.declare_exchange(channel).await?;
        let queue = self.declare_queue(channel).await?;
        let mut bindings = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            bindings.push(self.bind(channel, &queue, pattern).await?);
        }
        Ok((queue, bindings))
    }
}

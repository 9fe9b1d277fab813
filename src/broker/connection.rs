//! Connection, channel, and delivery seams for topic-exchange brokers.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

/// Error type for broker operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The connection was closed (explicitly or by the peer).
    #[error("connection closed")]
    ConnectionClosed,
    /// The channel was closed.
    #[error("channel closed")]
    ChannelClosed,
    /// A re-declaration disagreed with the existing entity's parameters.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    /// Exchange or queue does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Exclusive queue owned by another connection.
    #[error("resource locked: {0}")]
    ResourceLocked(String),
    /// The broker refused a published message.
    #[error("publish rejected: {0}")]
    Rejected(String),
    /// No connector for this URL scheme.
    #[error("unsupported broker url: {0}")]
    Unsupported(String),
    /// Transport or protocol failure reported by the client library.
    #[error("broker protocol error: {0}")]
    Protocol(String),
}

/// Parameters of a topic exchange.
///
/// Only topic exchanges exist in this system, so there is no kind field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSpec {
    pub name: String,
    /// Survives broker restarts.
    pub durable: bool,
    /// Deleted once the last binding goes away.
    pub auto_delete: bool,
    /// Not publishable by clients directly.
    pub internal: bool,
}

impl ExchangeSpec {
    /// Durable, non-auto-delete, non-internal topic exchange.
    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            auto_delete: false,
            internal: false,
        }
    }
}

/// Parameters of a queue. An empty `name` asks the broker to pick one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
    /// Deleted once its last consumer goes away.
    pub auto_delete: bool,
    /// Usable only by the declaring connection; deleted when it closes.
    pub exclusive: bool,
}

impl QueueSpec {
    /// Server-named, non-durable, auto-delete, exclusive.
    pub fn exclusive() -> Self {
        Self {
            name: String::new(),
            durable: false,
            auto_delete: true,
            exclusive: true,
        }
    }
}

/// Settles a delivery consumed in manual-acknowledgment mode.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    async fn ack(&self) -> Result<(), BrokerError>;
    async fn nack(&self, requeue: bool) -> Result<(), BrokerError>;
}

/// One message handed to a consumer.
pub struct Delivery {
    pub routing_key: String,
    pub body: Vec<u8>,
    /// True if this message was requeued after a previous delivery.
    pub redelivered: bool,
    acker: Option<Box<dyn Acknowledge>>,
}

impl Delivery {
    /// A delivery that is already settled (automatic acknowledgment).
    pub fn settled(routing_key: impl Into<String>, body: Vec<u8>, redelivered: bool) -> Self {
        Self {
            routing_key: routing_key.into(),
            body,
            redelivered,
            acker: None,
        }
    }

    /// A delivery the consumer must ack or nack.
    pub fn unsettled(
        routing_key: impl Into<String>,
        body: Vec<u8>,
        redelivered: bool,
        acker: Box<dyn Acknowledge>,
    ) -> Self {
        Self {
            routing_key: routing_key.into(),
            body,
            redelivered,
            acker: Some(acker),
        }
    }

    /// False once the broker already counts this message as consumed.
    pub fn needs_settlement(&self) -> bool {
        self.acker.is_some()
    }

    /// Acknowledge. A no-op for automatically acknowledged deliveries.
    pub async fn ack(self) -> Result<(), BrokerError> {
        match self.acker {
            Some(acker) => acker.ack().await,
            None => Ok(()),
        }
    }

    /// Reject, optionally asking for redelivery. A no-op for automatically
    /// acknowledged deliveries.
    pub async fn nack(self, requeue: bool) -> Result<(), BrokerError> {
        match self.acker {
            Some(acker) => acker.nack(requeue).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("routing_key", &self.routing_key)
            .field("body_len", &self.body.len())
            .field("redelivered", &self.redelivered)
            .field("settled", &self.acker.is_none())
            .finish()
    }
}

/// Stream of deliveries from one consumer subscription.
///
/// Ends when the channel or connection closes.
pub type Deliveries = Pin<Box<dyn Stream<Item = Result<Delivery, BrokerError>> + Send>>;

/// A lightweight virtual connection multiplexed over a [`BrokerConnection`].
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare an exchange. Repeating an identical declaration is a no-op.
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), BrokerError>;

    /// Declare a queue and return its (possibly broker-assigned) name.
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<String, BrokerError>;

    /// Bind `queue` to `exchange` under a routing-key pattern.
    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str)
        -> Result<(), BrokerError>;

    /// Publish `body` and wait for the broker to confirm it.
    async fn publish(&self, exchange: &str, routing_key: &str, body: &[u8])
        -> Result<(), BrokerError>;

    /// Start consuming `queue`. With `auto_ack`, deliveries arrive settled.
    async fn consume(&self, queue: &str, auto_ack: bool) -> Result<Deliveries, BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

/// The process-wide broker handle. Safe to open channels concurrently.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn create_channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError>;

    /// Close the connection; exclusive queues it declared are deleted.
    async fn close(&self) -> Result<(), BrokerError>;

    fn is_open(&self) -> bool;
}

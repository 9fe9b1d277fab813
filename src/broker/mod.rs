//! broker: topic-exchange messaging behind a small connection/channel seam.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        Topology (exchange + exclusive queue + bindings)      │
//! │  declare_exchange() / declare_queue() / bind()               │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │          BrokerConnection  →  BrokerChannel traits           │
//! │  create_channel() / close()                                  │
//! │  declare_* / bind_queue / publish / consume                  │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                      │
//!          ▼                                      ▼
//! ┌──────────────────┐                 ┌──────────────────────┐
//! │ InMemoryBroker   │                 │ AmqpConnection       │
//! │ (always built)   │                 │ (`amqp` feature)     │
//! └──────────────────┘                 └──────────────────────┘
//! ```
//!
//! The connection is one process-scoped handle: open it at startup, pass
//! `Arc<dyn BrokerConnection>` to whatever publishes or consumes, and call
//! `close()` at shutdown. Closing it removes every exclusive queue it
//! declared.

#[cfg(feature = "amqp")]
mod amqp;
mod connection;
mod in_memory;
mod topic;
mod topology;

use std::sync::Arc;

#[cfg(feature = "amqp")]
pub use amqp::{AmqpChannel, AmqpConnection};
pub use connection::{
    Acknowledge, BrokerChannel, BrokerConnection, BrokerError, Deliveries, Delivery, ExchangeSpec,
    QueueSpec,
};
pub use in_memory::{InMemoryBroker, InMemoryChannel, InMemoryConnection};
pub use topic::{matches, RoutingKey};
pub use topology::{DeclaredQueue, QueueBinding, Topology, DEFAULT_EXCHANGE};

/// Open a connection from a URL.
///
/// `memory://` opens a connection to a fresh in-process broker (useful
/// for single-process deployments and local runs). `amqp://` and
/// `amqps://` need the `amqp` feature.
pub async fn connect(url: &str) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
    if url.starts_with("memory://") {
        return Ok(Arc::new(InMemoryBroker::new().connect()));
    }

    #[cfg(feature = "amqp")]
    if url.starts_with("amqp://") || url.starts_with("amqps://") {
        return Ok(Arc::new(AmqpConnection::connect(url).await?));
    }

    Err(BrokerError::Unsupported(url.to_string()))
}

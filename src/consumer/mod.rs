//! consumer: subscribe to the topic exchange and fan deliveries out to
//! concurrent handlers.
//!
//! ## Flow
//!
//! ```text
//! exchange ──► exclusive queue ──► receive loop ──► classify(name)
//!                                      │                 │
//!                                      │          Forward│Ignore
//!                                      ▼                 ▼
//!                               one task per     HTTP adapter → logger
//!                                 delivery
//! ```
//!
//! The receive loop never waits for a handler (unless a concurrency bound is
//! configured), so ordering is not preserved past the receive step.
//!
//! ## Delivery guarantees
//!
//! | `AckMode` | Behaviour |
//! |-----------|-----------|
//! | `Auto` (default) | settled on receipt; a failed handler loses the message |
//! | `AfterHandler` | acked after the handler succeeds, nacked with requeue on failure |
//!
//! ## Example
//!
//! ```ignore
//! let consumer = Consumer::new(connection, Topology::default(), forwarder, ConsumerOptions::default()).await?;
//! let health = consumer.health();
//! let report = consumer.listen(&topics, tokio::signal::ctrl_c()).await?;
//! ```

mod classify;
mod listener;
mod state;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::broker::BrokerError;

pub use classify::{classify, Disposition};
pub use listener::{Consumer, ListenReport};
pub use state::{ConsumerState, Health};

/// When a delivery is settled with the broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Settled by the broker on delivery (at-most-once).
    #[default]
    Auto,
    /// Acked once the handler succeeds; nacked with requeue if it fails.
    AfterHandler,
}

/// How many handlers may run at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Concurrency {
    /// One task per delivery, no cap.
    #[default]
    Unbounded,
    /// At most `n` handlers; the receive loop waits for a free slot.
    Bounded(usize),
}

impl From<Option<usize>> for Concurrency {
    fn from(limit: Option<usize>) -> Self {
        match limit {
            Some(n) => Concurrency::Bounded(n.max(1)),
            None => Concurrency::Unbounded,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerOptions {
    pub ack_mode: AckMode,
    pub concurrency: Concurrency,
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("consumer setup failed: {0}")]
    Broker(#[from] BrokerError),
    #[error("consumer is closed")]
    Closed,
}

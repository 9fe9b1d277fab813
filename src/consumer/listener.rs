//! The receive loop.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

use super::classify::{classify, Disposition};
use super::state::{ConsumerState, Health, StateCell};
use super::{AckMode, Concurrency, ConsumerError, ConsumerOptions};
use crate::adapter::{Adapter, WireMessage};
use crate::broker::{BrokerChannel, BrokerConnection, Delivery, Topology};

/// Counts from one `listen` run, read after every handler has finished.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ListenReport {
    /// Deliveries taken off the queue.
    pub received: usize,
    /// Handlers that reached the logging capability.
    pub forwarded: usize,
    /// Messages classified as no-ops.
    pub ignored: usize,
    /// Handlers whose forward failed.
    pub failed: usize,
    /// Bodies that were not a `{name, data}` message.
    pub dropped: usize,
}

#[derive(Default)]
struct Counters {
    received: AtomicUsize,
    forwarded: AtomicUsize,
    ignored: AtomicUsize,
    failed: AtomicUsize,
    dropped: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn report(&self) -> ListenReport {
        ListenReport {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Subscribes to the exchange and hands each delivery to its own task.
pub struct Consumer {
    connection: Arc<dyn BrokerConnection>,
    topology: Topology,
    forwarder: Arc<dyn Adapter>,
    options: ConsumerOptions,
    setup: Box<dyn BrokerChannel>,
    state: StateCell,
}

impl Consumer {
    /// Open a channel and declare the exchange.
    pub async fn new(
        connection: Arc<dyn BrokerConnection>,
        topology: Topology,
        forwarder: Arc<dyn Adapter>,
        options: ConsumerOptions,
    ) -> Result<Self, ConsumerError> {
        let setup = connection.create_channel().await?;
        topology.declare_exchange(setup.as_ref()).await?;

        let state = StateCell::new();
        state.set(ConsumerState::ChannelOpen);
        Ok(Self {
            connection,
            topology,
            forwarder,
            options,
            setup,
            state,
        })
    }

    pub fn health(&self) -> Health {
        self.state.health()
    }

    pub fn state(&self) -> ConsumerState {
        self.state.get()
    }

    /// Bind a fresh exclusive queue to every topic and process deliveries
    /// until `shutdown` resolves or the delivery stream ends.
    ///
    /// In-flight handlers are awaited before returning. Calling `listen`
    /// again after it returns fails with [`ConsumerError::Closed`].
    pub async fn listen<S>(
        &self,
        topics: &[String],
        shutdown: S,
    ) -> Result<ListenReport, ConsumerError>
    where
        S: Future + Send,
    {
        if self.state() == ConsumerState::Closed {
            return Err(ConsumerError::Closed);
        }

        let channel = self.connection.create_channel().await?;
        let queue = self.topology.declare_queue(channel.as_ref()).await?;
        for topic in topics {
            self.topology.bind(channel.as_ref(), &queue, topic).await?;
        }
        let auto_ack = self.options.ack_mode == AckMode::Auto;
        let mut deliveries = channel.consume(&queue.name, auto_ack).await?;

        self.state.set(ConsumerState::Subscribed);
        tracing::info!(
            queue = %queue.name,
            exchange = self.topology.exchange(),
            topics = ?topics,
            "waiting for messages"
        );

        let counters = Arc::new(Counters::default());
        let limiter = match self.options.concurrency {
            Concurrency::Bounded(n) => Some(Arc::new(Semaphore::new(n))),
            Concurrency::Unbounded => None,
        };
        let mut handlers = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            let permit = match &limiter {
                Some(limiter) => tokio::select! {
                    _ = &mut shutdown => {
                        tracing::info!("shutdown requested");
                        break;
                    }
                    permit = Arc::clone(limiter).acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                },
                None => None,
            };

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "message handler panicked");
                    }
                }
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => {
                        self.receive(delivery, permit, &counters, &mut handlers).await;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "delivery stream failed");
                        break;
                    }
                    None => {
                        tracing::info!("delivery stream ended");
                        break;
                    }
                },
            }
        }

        self.state.set(ConsumerState::Closed);
        drop(deliveries);

        while let Some(joined) = handlers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "message handler panicked");
            }
        }

        if let Err(e) = channel.close().await {
            tracing::debug!(error = %e, "closing consumer channel failed");
        }
        if let Err(e) = self.setup.close().await {
            tracing::debug!(error = %e, "closing setup channel failed");
        }

        let report = counters.report();
        tracing::info!(?report, "consumer stopped");
        Ok(report)
    }

    /// Decode and classify one delivery, spawning a handler when it needs
    /// forwarding.
    async fn receive(
        &self,
        delivery: Delivery,
        permit: Option<OwnedSemaphorePermit>,
        counters: &Arc<Counters>,
        handlers: &mut JoinSet<()>,
    ) {
        Counters::bump(&counters.received);

        let message: WireMessage = match serde_json::from_slice(&delivery.body) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    routing_key = %delivery.routing_key,
                    error = %e,
                    "dropping undecodable message"
                );
                Counters::bump(&counters.dropped);
                settle(delivery, Err(false)).await;
                return;
            }
        };

        tracing::debug!(
            routing_key = %delivery.routing_key,
            name = %message.name,
            "message received"
        );

        match classify(&message.name) {
            Disposition::Ignore => {
                Counters::bump(&counters.ignored);
                settle(delivery, Ok(())).await;
            }
            Disposition::Forward => {
                let forwarder = Arc::clone(&self.forwarder);
                let counters = Arc::clone(counters);
                handlers.spawn(async move {
                    let _permit = permit;
                    forward(forwarder, message, delivery, counters).await;
                });
            }
        }
    }
}

async fn forward(
    forwarder: Arc<dyn Adapter>,
    message: WireMessage,
    delivery: Delivery,
    counters: Arc<Counters>,
) {
    let payload = match serde_json::to_value(&message) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "could not marshal message");
            Counters::bump(&counters.failed);
            settle(delivery, Err(false)).await;
            return;
        }
    };

    match forwarder.invoke(payload).await {
        Ok(_) => {
            Counters::bump(&counters.forwarded);
            settle(delivery, Ok(())).await;
        }
        Err(e) => {
            tracing::error!(
                name = %message.name,
                transport = %forwarder.kind(),
                error = %e,
                "forwarding message failed"
            );
            Counters::bump(&counters.failed);
            // One retry through the broker; a redelivered failure is discarded.
            let requeue = !delivery.redelivered;
            settle(delivery, Err(requeue)).await;
        }
    }
}

/// Ack on `Ok`, nack on `Err(requeue)`. No-op for settled deliveries.
async fn settle(delivery: Delivery, outcome: Result<(), bool>) {
    if !delivery.needs_settlement() {
        return;
    }
    let result = match outcome {
        Ok(()) => delivery.ack().await,
        Err(requeue) => delivery.nack(requeue).await,
    };
    if let Err(e) = result {
        tracing::warn!(error = %e, "could not settle delivery");
    }
}

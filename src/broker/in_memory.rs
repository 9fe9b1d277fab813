//! In-process topic broker for tests and single-process deployments.
//!
//! Follows broker semantics closely enough that the consumer and publish
//! code paths behave the same against it as against a real server:
//!
//! - Exchanges and queues are declared idempotently; a re-declaration with
//!   different parameters fails with `PreconditionFailed`.
//! - Server-named queues get an `amq.gen-<uuid>` name.
//! - Exclusive queues belong to the declaring connection. Other
//!   connections get `ResourceLocked`; closing (or dropping) the owner
//!   deletes them.
//! - Auto-delete queues disappear once their last consumer goes away.
//! - A publish is delivered at most once per bound queue, however many of
//!   its bindings match. Unroutable messages are discarded.
//! - Multiple consumers on one queue get messages round-robin; a queue with
//!   no consumers buffers messages until one subscribes.
//!
//! ## Example
//!
//! ```ignore
//! use switchboard::broker::{BrokerConnection, ExchangeSpec, InMemoryBroker};
//!
//! let broker = InMemoryBroker::new();
//! let connection = broker.connect();
//! let channel = connection.create_channel().await?;
//! channel.declare_exchange(&ExchangeSpec::topic("events.topic")).await?;
//! channel.publish("events.topic", "log.INFO", br#"{"name":"log","data":"x"}"#).await?;
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use super::connection::{
    Acknowledge, BrokerChannel, BrokerConnection, BrokerError, Deliveries, Delivery, ExchangeSpec,
    QueueSpec,
};
use super::topic;

#[derive(Debug, Clone)]
struct Message {
    routing_key: String,
    body: Vec<u8>,
    redelivered: bool,
}

struct ConsumerSlot {
    connection: u64,
    channel: u64,
    auto_ack: bool,
    tx: mpsc::UnboundedSender<Result<Delivery, BrokerError>>,
}

struct Queue {
    spec: QueueSpec,
    owner: u64,
    bindings: Vec<(String, String)>,
    backlog: VecDeque<Message>,
    consumers: Vec<ConsumerSlot>,
    cursor: usize,
    had_consumer: bool,
}

#[derive(Default)]
struct State {
    exchanges: HashMap<String, ExchangeSpec>,
    queues: HashMap<String, Queue>,
    open_connections: HashSet<u64>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Shared broker state. Clones refer to the same broker.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection to this broker.
    pub fn connect(&self) -> InMemoryConnection {
        let id = {
            let mut state = self.state.lock();
            let id = state.next_id();
            state.open_connections.insert(id);
            id
        };
        InMemoryConnection {
            id,
            broker: self.clone(),
            open: AtomicBool::new(true),
        }
    }

    /// Parameters of a declared exchange.
    pub fn exchange(&self, name: &str) -> Option<ExchangeSpec> {
        self.state.lock().exchanges.get(name).cloned()
    }

    /// True if a queue with this name currently exists.
    pub fn has_queue(&self, name: &str) -> bool {
        self.state.lock().queues.contains_key(name)
    }

    /// Messages waiting in a queue for a consumer.
    pub fn queue_depth(&self, name: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(name)
            .map(|q| q.backlog.len())
            .unwrap_or(0)
    }

    /// Binding patterns of a queue, as `(exchange, pattern)` pairs.
    pub fn bindings(&self, queue: &str) -> Vec<(String, String)> {
        self.state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.bindings.clone())
            .unwrap_or_default()
    }

    fn enqueue(&self, queue: &str, message: Message) {
        let mut state = self.state.lock();
        deliver(&self.state, &mut state, queue, message);
    }

    fn close_connection(&self, id: u64) {
        let mut state = self.state.lock();
        if !state.open_connections.remove(&id) {
            return;
        }
        state.queues.retain(|_, q| !(q.spec.exclusive && q.owner == id));
        drop_consumers(&mut state, |slot| slot.connection == id);
    }

    fn close_channel(&self, channel: u64) {
        let mut state = self.state.lock();
        drop_consumers(&mut state, |slot| slot.channel == channel);
    }
}

/// Route one message to a queue: next consumer in turn, or the backlog.
fn deliver(shared: &Arc<Mutex<State>>, state: &mut State, queue_name: &str, message: Message) {
    let Some(queue) = state.queues.get_mut(queue_name) else {
        return;
    };
    while !queue.consumers.is_empty() {
        let index = queue.cursor % queue.consumers.len();
        queue.cursor = queue.cursor.wrapping_add(1);
        let slot = &queue.consumers[index];
        let delivery = if slot.auto_ack {
            Delivery::settled(message.routing_key.clone(), message.body.clone(), message.redelivered)
        } else {
            Delivery::unsettled(
                message.routing_key.clone(),
                message.body.clone(),
                message.redelivered,
                Box::new(InMemoryAcker {
                    broker: InMemoryBroker {
                        state: Arc::clone(shared),
                    },
                    queue: queue_name.to_string(),
                    message: message.clone(),
                    settled: AtomicBool::new(false),
                }),
            )
        };
        if slot.tx.send(Ok(delivery)).is_ok() {
            return;
        }
        // Receiver gone: forget the consumer and try the next one.
        queue.consumers.remove(index);
    }
    queue.backlog.push_back(message);
}

fn drop_consumers(state: &mut State, doomed: impl Fn(&ConsumerSlot) -> bool) {
    for queue in state.queues.values_mut() {
        queue.consumers.retain(|slot| !doomed(slot));
    }
    state
        .queues
        .retain(|_, q| !(q.spec.auto_delete && q.had_consumer && q.consumers.is_empty()));
}

struct InMemoryAcker {
    broker: InMemoryBroker,
    queue: String,
    message: Message,
    settled: AtomicBool,
}

#[async_trait]
impl Acknowledge for InMemoryAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.settled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if requeue {
            let mut message = self.message.clone();
            message.redelivered = true;
            self.broker.enqueue(&self.queue, message);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// One connection to an [`InMemoryBroker`]. Dropping it closes it.
pub struct InMemoryConnection {
    id: u64,
    broker: InMemoryBroker,
    open: AtomicBool,
}

impl InMemoryConnection {
    fn shutdown(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.broker.close_connection(self.id);
        }
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[async_trait]
impl BrokerConnection for InMemoryConnection {
    async fn create_channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError> {
        if !self.is_open() {
            return Err(BrokerError::ConnectionClosed);
        }
        let id = self.broker.state.lock().next_id();
        Ok(Box::new(InMemoryChannel {
            id,
            connection: self.id,
            broker: self.broker.clone(),
            open: AtomicBool::new(true),
        }))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.shutdown();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

pub struct InMemoryChannel {
    id: u64,
    connection: u64,
    broker: InMemoryBroker,
    open: AtomicBool,
}

impl InMemoryChannel {
    fn ensure_open(&self, state: &State) -> Result<(), BrokerError> {
        if !state.open_connections.contains(&self.connection) {
            return Err(BrokerError::ConnectionClosed);
        }
        if !self.open.load(Ordering::SeqCst) {
            return Err(BrokerError::ChannelClosed);
        }
        Ok(())
    }

    fn check_access(&self, queue: &Queue, name: &str) -> Result<(), BrokerError> {
        if queue.spec.exclusive && queue.owner != self.connection {
            return Err(BrokerError::ResourceLocked(format!(
                "queue '{name}' is exclusive to another connection"
            )));
        }
        Ok(())
    }
}

impl Drop for InMemoryChannel {
    fn drop(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.broker.close_channel(self.id);
        }
    }
}

#[async_trait]
impl BrokerChannel for InMemoryChannel {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), BrokerError> {
        let mut state = self.broker.state.lock();
        self.ensure_open(&state)?;
        if let Some(existing) = state.exchanges.get(&spec.name) {
            if existing != spec {
                return Err(BrokerError::PreconditionFailed(format!(
                    "exchange '{}' redeclared with different parameters",
                    spec.name
                )));
            }
            return Ok(());
        }
        state.exchanges.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<String, BrokerError> {
        let mut state = self.broker.state.lock();
        self.ensure_open(&state)?;

        let name = if spec.name.is_empty() {
            format!("amq.gen-{}", Uuid::new_v4().simple())
        } else {
            spec.name.clone()
        };

        if let Some(existing) = state.queues.get(&name) {
            self.check_access(existing, &name)?;
            let requested = QueueSpec {
                name: name.clone(),
                ..spec.clone()
            };
            if existing.spec != requested {
                return Err(BrokerError::PreconditionFailed(format!(
                    "queue '{name}' redeclared with different parameters"
                )));
            }
            return Ok(name);
        }

        state.queues.insert(
            name.clone(),
            Queue {
                spec: QueueSpec {
                    name: name.clone(),
                    ..spec.clone()
                },
                owner: self.connection,
                bindings: Vec::new(),
                backlog: VecDeque::new(),
                consumers: Vec::new(),
                cursor: 0,
                had_consumer: false,
            },
        );
        Ok(name)
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<(), BrokerError> {
        let mut state = self.broker.state.lock();
        self.ensure_open(&state)?;
        if !state.exchanges.contains_key(exchange) {
            return Err(BrokerError::NotFound(format!("exchange '{exchange}'")));
        }
        let entry = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::NotFound(format!("queue '{queue}'")))?;
        self.check_access(entry, queue)?;
        let binding = (exchange.to_string(), pattern.to_string());
        if !entry.bindings.contains(&binding) {
            entry.bindings.push(binding);
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), BrokerError> {
        let mut state = self.broker.state.lock();
        self.ensure_open(&state)?;
        if !state.exchanges.contains_key(exchange) {
            return Err(BrokerError::NotFound(format!("exchange '{exchange}'")));
        }

        let targets: Vec<String> = state
            .queues
            .iter()
            .filter(|(_, q)| {
                q.bindings
                    .iter()
                    .any(|(ex, pattern)| ex == exchange && topic::matches(pattern, routing_key))
            })
            .map(|(name, _)| name.clone())
            .collect();

        for queue in targets {
            let message = Message {
                routing_key: routing_key.to_string(),
                body: body.to_vec(),
                redelivered: false,
            };
            deliver(&self.broker.state, &mut state, &queue, message);
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, auto_ack: bool) -> Result<Deliveries, BrokerError> {
        let mut state = self.broker.state.lock();
        self.ensure_open(&state)?;
        let consumer_id = state.next_id();
        let entry = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::NotFound(format!("queue '{queue}'")))?;
        self.check_access(entry, queue)?;

        let (tx, rx) = mpsc::unbounded_channel();
        entry.consumers.push(ConsumerSlot {
            connection: self.connection,
            channel: self.id,
            auto_ack,
            tx,
        });
        entry.had_consumer = true;

        let backlog: Vec<Message> = entry.backlog.drain(..).collect();
        for message in backlog {
            deliver(&self.broker.state, &mut state, queue, message);
        }

        tracing::debug!(queue, consumer = consumer_id, auto_ack, "consumer registered");
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.broker.close_channel(self.id);
        }
        Ok(())
    }
}

//! Consumer lifecycle state, published through a watch channel.

use std::fmt;

use tokio::sync::watch;

/// `Disconnected → ChannelOpen → Subscribed → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    /// Setup channel open and exchange declared.
    ChannelOpen,
    /// Queue bound and deliveries flowing.
    Subscribed,
    /// Shut down or the delivery stream ended. Terminal.
    Closed,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsumerState::Disconnected => "disconnected",
            ConsumerState::ChannelOpen => "channel_open",
            ConsumerState::Subscribed => "subscribed",
            ConsumerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Read side of a consumer's state. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Health {
    rx: watch::Receiver<ConsumerState>,
}

impl Health {
    pub(crate) fn new(rx: watch::Receiver<ConsumerState>) -> Self {
        Self { rx }
    }

    pub fn state(&self) -> ConsumerState {
        *self.rx.borrow()
    }

    /// Healthy exactly while subscribed.
    pub fn is_healthy(&self) -> bool {
        self.state() == ConsumerState::Subscribed
    }

    /// Wait until the state equals `target`. Returns the last state seen if
    /// the consumer is dropped first.
    pub async fn wait_for(&mut self, target: ConsumerState) -> ConsumerState {
        loop {
            let current = *self.rx.borrow_and_update();
            if current == target {
                return current;
            }
            if self.rx.changed().await.is_err() {
                return *self.rx.borrow();
            }
        }
    }
}

/// Write side, owned by the consumer.
#[derive(Debug)]
pub(crate) struct StateCell {
    tx: watch::Sender<ConsumerState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(ConsumerState::Disconnected);
        Self { tx }
    }

    pub(crate) fn set(&self, state: ConsumerState) {
        let previous = self.tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "consumer state changed");
        }
    }

    pub(crate) fn get(&self) -> ConsumerState {
        *self.tx.borrow()
    }

    pub(crate) fn health(&self) -> Health {
        Health::new(self.tx.subscribe())
    }
}

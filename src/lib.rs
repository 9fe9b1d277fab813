pub mod adapter;
pub mod broker;
pub mod config;
pub mod consumer;
pub mod dispatch;
pub mod envelope;
mod error;
pub mod server;

pub use adapter::{Adapter, AdapterError, Invocation, Target, TransportKind};
pub use broker::{BrokerConnection, BrokerError, InMemoryBroker, Topology};
pub use config::{Config, ConfigError};
pub use consumer::{AckMode, Concurrency, Consumer, ConsumerError, ConsumerOptions, ListenReport};
pub use dispatch::{DispatchError, Dispatched, Dispatcher, RouteTable};
pub use envelope::{ActionEnvelope, DecodeError, DecodeOptions, ResponseEnvelope};
pub use error::{Error, Result};

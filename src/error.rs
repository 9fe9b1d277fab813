use thiserror::Error;

use crate::broker::BrokerError;
use crate::config::ConfigError;
use crate::consumer::ConsumerError;

/// Errors that stop a process from starting or running.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("broker: {0}")]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Consumer(#[from] ConsumerError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

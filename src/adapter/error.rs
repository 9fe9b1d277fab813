//! Error type shared by every transport adapter.

use thiserror::Error;

/// Why an adapter call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// Dial, write, or read failed, or the remote end reported a call error.
    #[error("could not reach service: {0}")]
    ConnectFailed(String),
    /// The transport's deadline passed before the peer answered.
    #[error("could not reach service: deadline exceeded")]
    Timeout,
    /// The peer answered with something other than the expected status.
    #[error("unexpected status code: {code}")]
    UpstreamStatus { code: u16, message: Option<String> },
    /// The payload or the peer's reply could not be (de)serialized.
    #[error("error decoding remote response: {0}")]
    DecodeFailed(String),
}

impl AdapterError {
    pub fn upstream(code: u16) -> Self {
        AdapterError::UpstreamStatus {
            code,
            message: None,
        }
    }

    /// True for the one status that maps to "unauthorized" at the outer layer.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AdapterError::UpstreamStatus { code: 401, .. })
    }

    /// Map this error to an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        if self.is_unauthorized() {
            401
        } else {
            500
        }
    }

    /// The message surfaced to the caller of the router.
    pub fn public_message(&self) -> String {
        match self {
            AdapterError::UpstreamStatus {
                code: 401,
                message: None,
            } => "invalid credentials".to_string(),
            AdapterError::UpstreamStatus {
                code: 401,
                message: Some(message),
            } => message.clone(),
            AdapterError::UpstreamStatus {
                message: Some(message),
                ..
            } => format!("{self}: {message}"),
            other => other.to_string(),
        }
    }
}

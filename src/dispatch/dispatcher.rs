//! Route an action envelope to exactly one adapter and reshape the answer.

use std::sync::Arc;

use thiserror::Error;

use super::route::RouteTable;
use crate::adapter::{Adapter, AdapterError};
use crate::envelope::{ActionEnvelope, LogPayload, ResponseEnvelope};

/// Why a dispatch failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No route for this action. No adapter was invoked.
    #[error("unknown action: {0}")]
    UnknownAction(String),
    /// The action's own payload was absent.
    #[error("missing {0} payload")]
    MissingPayload(String),
    #[error("could not marshal json")]
    Marshal(#[source] serde_json::Error),
    /// A route that was never wired up (e.g. no gRPC logger).
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

impl DispatchError {
    /// Map this error to an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            DispatchError::UnknownAction(_) => 400,
            DispatchError::MissingPayload(_) => 400,
            DispatchError::Marshal(_) => 500,
            DispatchError::NotConfigured(_) => 500,
            DispatchError::Adapter(e) => e.status_code(),
        }
    }

    pub fn public_message(&self) -> String {
        match self {
            DispatchError::Adapter(e) => e.public_message(),
            other => other.to_string(),
        }
    }
}

/// Outcome of one dispatch: status code plus the envelope to send back.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub status: u16,
    pub envelope: ResponseEnvelope,
}

impl Dispatched {
    pub fn accepted(envelope: ResponseEnvelope) -> Self {
        Self {
            status: 202,
            envelope,
        }
    }
}

impl From<DispatchError> for Dispatched {
    fn from(err: DispatchError) -> Self {
        Self {
            status: err.status_code(),
            envelope: ResponseEnvelope::failure(err.public_message()),
        }
    }
}

/// Looks the action up in the route table and invokes its adapter once.
///
/// No retries, no fan-out. Holds no per-request state, so one instance
/// serves every request concurrently.
///
/// ## Example
///
/// ```ignore
/// let dispatcher = Dispatcher::new(RouteTable::from_config(&config, None)?);
/// let Dispatched { status, envelope } = dispatcher.dispatch(&request).await;
/// ```
pub struct Dispatcher {
    routes: RouteTable,
    grpc_logger: Option<Arc<dyn Adapter>>,
}

impl Dispatcher {
    pub fn new(routes: RouteTable) -> Self {
        Self {
            routes,
            grpc_logger: None,
        }
    }

    /// Adapter used by [`log_via_grpc`](Self::log_via_grpc).
    pub fn with_grpc_logger(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.grpc_logger = Some(adapter);
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Dispatch and fold any error into a failure envelope.
    pub async fn dispatch(&self, envelope: &ActionEnvelope) -> Dispatched {
        match self.try_dispatch(envelope).await {
            Ok(response) => Dispatched::accepted(response),
            Err(e) => {
                tracing::warn!(action = %envelope.action, error = %e, "dispatch failed");
                e.into()
            }
        }
    }

    pub async fn try_dispatch(
        &self,
        envelope: &ActionEnvelope,
    ) -> Result<ResponseEnvelope, DispatchError> {
        let action = envelope.action.as_str();
        let route = self
            .routes
            .get(&envelope.action)
            .ok_or_else(|| DispatchError::UnknownAction(action.to_string()))?;

        let payload = envelope
            .active_payload()
            .map_err(DispatchError::Marshal)?
            .ok_or_else(|| DispatchError::MissingPayload(action.to_string()))?;

        tracing::debug!(
            action,
            transport = %route.adapter.kind(),
            address = %route.adapter.target().address,
            "dispatching"
        );

        let outcome = route.adapter.invoke(payload).await?;
        let message = (route.summarize)(envelope, &outcome);
        Ok(ResponseEnvelope::success(message, outcome.data))
    }

    /// Write one log entry through the gRPC logger.
    pub async fn log_via_grpc(&self, entry: &LogPayload) -> Dispatched {
        match self.try_log_via_grpc(entry).await {
            Ok(()) => Dispatched::accepted(ResponseEnvelope::success("logged", None)),
            Err(e) => {
                tracing::warn!(error = %e, "grpc log failed");
                e.into()
            }
        }
    }

    async fn try_log_via_grpc(&self, entry: &LogPayload) -> Result<(), DispatchError> {
        let adapter = self
            .grpc_logger
            .as_ref()
            .ok_or(DispatchError::NotConfigured("grpc logger"))?;
        let payload = serde_json::to_value(entry).map_err(DispatchError::Marshal)?;
        adapter.invoke(payload).await?;
        Ok(())
    }
}

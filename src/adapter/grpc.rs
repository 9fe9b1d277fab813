//! gRPC adapter: unary `WriteLog` call under a hard deadline.
//!
//! Requires the `grpc` feature. Uses tonic for transport and prost for
//! message serialization (standard protobuf wire format, no `.proto` file;
//! the service stubs are generated by `build.rs`).
//!
//! ## RPCs
//!
//! - `logs.LogService/WriteLog`: input `LogRequest`, output `LogResponse`.
//!
//! ## Security
//!
//! `http://` endpoints use plaintext HTTP/2 and belong on trusted networks
//! only. `https://` endpoints need a [`ClientTlsConfig`], supplied through
//! [`GrpcAdapter::with_tls`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tonic::transport::{ClientTlsConfig, Endpoint};
use tonic::{Code, Request, Status};

use super::{Adapter, AdapterError, Invocation, Target, TransportKind};
use crate::envelope::LogPayload;

/// Default deadline for one connect-and-call round.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Message types (prost, standard protobuf wire format)
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct Log {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub data: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LogRequest {
    #[prost(message, optional, tag = "1")]
    pub log_entry: Option<Log>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LogResponse {
    #[prost(string, tag = "1")]
    pub result: String,
}

impl From<LogPayload> for Log {
    fn from(payload: LogPayload) -> Self {
        Self {
            name: payload.name,
            data: payload.data,
        }
    }
}

// ---------------------------------------------------------------------------
// Generated service trait + server/client
// ---------------------------------------------------------------------------

include!(concat!(env!("OUT_DIR"), "/logs.LogService.rs"));

pub use log_service_client::LogServiceClient;
pub use log_service_server::{LogService, LogServiceServer};

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Writes one log entry per call to a remote `LogService`.
///
/// Connect and call share one deadline (default one second). The channel
/// is dropped when the call returns, so nothing is pooled across calls.
pub struct GrpcAdapter {
    target: Target,
    deadline: Duration,
    tls: Option<ClientTlsConfig>,
}

impl GrpcAdapter {
    /// `endpoint` is a URI such as `http://logger-service:50001`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            target: Target {
                kind: TransportKind::Grpc,
                address: endpoint.into(),
                endpoint: "/logs.LogService/WriteLog".to_string(),
                timeout: Some(DEFAULT_DEADLINE),
            },
            deadline: DEFAULT_DEADLINE,
            tls: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self.target.timeout = Some(deadline);
        self
    }

    pub fn with_tls(mut self, tls: ClientTlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Write one entry, bounded by the adapter's deadline.
    pub async fn write_log(&self, entry: Log) -> Result<String, AdapterError> {
        match tokio::time::timeout(self.deadline, self.connect_and_call(entry)).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout),
        }
    }

    async fn connect_and_call(&self, entry: Log) -> Result<String, AdapterError> {
        let mut endpoint = Endpoint::from_shared(self.target.address.clone())
            .map_err(|e| AdapterError::ConnectFailed(e.to_string()))?
            .connect_timeout(self.deadline);
        if let Some(tls) = &self.tls {
            endpoint = endpoint
                .tls_config(tls.clone())
                .map_err(|e| AdapterError::ConnectFailed(e.to_string()))?;
        }
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| AdapterError::ConnectFailed(e.to_string()))?;

        let mut client = LogServiceClient::new(channel);
        let mut request = Request::new(LogRequest {
            log_entry: Some(entry),
        });
        request.set_timeout(self.deadline);

        let response = client.write_log(request).await.map_err(status_error)?;
        Ok(response.into_inner().result)
    }
}

#[async_trait]
impl Adapter for GrpcAdapter {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn invoke(&self, payload: Value) -> Result<Invocation, AdapterError> {
        let entry: LogPayload = serde_json::from_value(payload)
            .map_err(|e| AdapterError::DecodeFailed(format!("could not marshal payload: {e}")))?;
        let result = self.write_log(entry.into()).await?;
        Ok(Invocation::message(result))
    }
}

/// Map a gRPC status onto the adapter taxonomy.
fn status_error(status: Status) -> AdapterError {
    match status.code() {
        Code::DeadlineExceeded | Code::Cancelled => AdapterError::Timeout,
        Code::Unavailable => AdapterError::ConnectFailed(status.message().to_string()),
        Code::Unauthenticated => AdapterError::UpstreamStatus {
            code: 401,
            message: Some(status.message().to_string()),
        },
        code => AdapterError::UpstreamStatus {
            code: u16::try_from(code as i32).unwrap_or(u16::MAX),
            message: Some(status.message().to_string()),
        },
    }
}

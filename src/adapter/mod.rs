//! adapter: one "invoke a downstream capability" contract, four transports.
//!
//! Every transport implements [`Adapter`]. The dispatcher only ever sees
//! `Arc<dyn Adapter>`, picked from a static route table, so adding a
//! transport never touches dispatch logic.
//!
//! | Transport | Type | Wire |
//! |-----------|------|------|
//! | HTTP-REST | [`HttpAdapter`] | JSON `POST`, expects `202 Accepted` |
//! | Binary RPC | [`RpcAdapter`] | length-prefixed bitcode frames over TCP |
//! | gRPC | `GrpcAdapter` | unary `logs.LogService/WriteLog` (requires `grpc`) |
//! | Publish | [`PublishAdapter`] | JSON body onto the topic exchange |
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use switchboard::adapter::{Adapter, HttpAdapter};
//!
//! let auth: Arc<dyn Adapter> = Arc::new(HttpAdapter::new(url).decode_envelope(true));
//! let outcome = auth.invoke(json!({ "email": "a@b.c", "password": "pw" })).await?;
//! ```

mod error;
mod http;
mod publish;
pub mod rpc;

#[cfg(feature = "grpc")]
pub mod grpc;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use error::AdapterError;
pub use http::HttpAdapter;
pub use publish::{PublishAdapter, WireMessage};
pub use rpc::RpcAdapter;

#[cfg(feature = "grpc")]
pub use grpc::GrpcAdapter;

/// Which wire a target is reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    Rpc,
    Grpc,
    Publish,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Http => "http",
            TransportKind::Rpc => "rpc",
            TransportKind::Grpc => "grpc",
            TransportKind::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Static description of where an adapter sends its calls.
///
/// Built from configuration when the adapter is constructed and never
/// changed afterwards. Nothing in a request can redirect it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub kind: TransportKind,
    /// `host:port`, gRPC endpoint, or exchange name.
    pub address: String,
    /// URL path, remote procedure name, or routing key.
    pub endpoint: String,
    /// Hard deadline, when the transport enforces one.
    pub timeout: Option<Duration>,
}

/// What a successful invocation hands back to the dispatcher.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    /// Human-readable summary from the peer, if it sent one.
    pub message: Option<String>,
    /// Opaque data from the peer, passed through untouched.
    pub data: Option<Value>,
}

impl Invocation {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            data: None,
        }
    }
}

/// A transport-specific way of invoking one downstream capability.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Where this adapter sends its calls.
    fn target(&self) -> &Target;

    fn kind(&self) -> TransportKind {
        self.target().kind
    }

    /// Send `payload` to the target and wait for its answer.
    async fn invoke(&self, payload: Value) -> Result<Invocation, AdapterError>;
}

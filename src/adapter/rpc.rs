//! Binary RPC: one named remote procedure per call, fresh TCP connection
//! each time.
//!
//! ## Wire format
//!
//! Every message is a frame: a 4-byte big-endian length followed by that
//! many bytes of bitcode. The client sends one [`RpcCall`] and reads one
//! [`RpcReply`]. Servers keep reading calls until the client hangs up.
//!
//! ```text
//! ┌──────────┬──────────────────────────────┐
//! │ len: u32 │ bitcode(RpcCall | RpcReply)  │
//! └──────────┴──────────────────────────────┘
//! ```
//!
//! Procedure names follow `"<Service>.<Method>"`, e.g. `RPCServer.LogInfo`.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::{Adapter, AdapterError, Invocation, Target, TransportKind};
use crate::envelope::LogPayload;

/// Frames above this size are refused on read.
pub const MAX_FRAME: u32 = 16 * 1024 * 1024;

/// The single argument every procedure takes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcArgs {
    pub name: String,
    pub data: String,
}

impl From<LogPayload> for RpcArgs {
    fn from(payload: LogPayload) -> Self {
        Self {
            name: payload.name,
            data: payload.data,
        }
    }
}

/// A call frame: procedure name plus argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcCall {
    pub method: String,
    pub args: RpcArgs,
}

/// A reply frame: the procedure's string result or its error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcReply {
    pub result: Result<String, String>,
}

/// Write one length-prefixed bitcode frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = bitcode::serialize(message)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    let len = u32::try_from(bytes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_u32(len).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await
}

/// Read one frame. Returns `Ok(None)` on a clean end of stream.
pub async fn read_frame<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = match reader.read_u32().await {
        Ok(len) => len,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if len > MAX_FRAME {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    bitcode::deserialize(&buf)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Calls one remote procedure over a fresh connection per invocation.
///
/// No pooling: every `invoke` dials, sends one call, reads one reply, and
/// drops the socket. Dial, I/O, and remote errors all surface as
/// `ConnectFailed`.
pub struct RpcAdapter {
    target: Target,
}

impl RpcAdapter {
    pub fn new(address: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            target: Target {
                kind: TransportKind::Rpc,
                address: address.into(),
                endpoint: method.into(),
                timeout: None,
            },
        }
    }

    /// Send a single call and wait for its reply.
    pub async fn call(&self, args: RpcArgs) -> Result<String, AdapterError> {
        let mut stream = TcpStream::connect(&self.target.address)
            .await
            .map_err(|e| AdapterError::ConnectFailed(e.to_string()))?;

        let call = RpcCall {
            method: self.target.endpoint.clone(),
            args,
        };
        write_frame(&mut stream, &call)
            .await
            .map_err(|e| AdapterError::ConnectFailed(e.to_string()))?;

        let reply: RpcReply = read_frame(&mut stream)
            .await
            .map_err(|e| AdapterError::ConnectFailed(e.to_string()))?
            .ok_or_else(|| AdapterError::ConnectFailed("connection closed before reply".into()))?;

        reply.result.map_err(AdapterError::ConnectFailed)
    }
}

#[async_trait]
impl Adapter for RpcAdapter {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn invoke(&self, payload: Value) -> Result<Invocation, AdapterError> {
        let entry: LogPayload = serde_json::from_value(payload)
            .map_err(|e| AdapterError::DecodeFailed(format!("could not marshal payload: {e}")))?;
        let result = self.call(entry.into()).await?;
        Ok(Invocation::message(result))
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A remote procedure a [`RpcServer`] can dispatch to.
#[async_trait]
pub trait Procedure: Send + Sync {
    async fn call(&self, args: RpcArgs) -> Result<String, String>;
}

#[async_trait]
impl<F, Fut> Procedure for F
where
    F: Fn(RpcArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, String>> + Send,
{
    async fn call(&self, args: RpcArgs) -> Result<String, String> {
        (self)(args).await
    }
}

/// Accepts connections and answers calls to registered procedures.
///
/// ## Example
///
/// ```ignore
/// let server = RpcServer::new().procedure("RPCServer.LogInfo", |args: RpcArgs| async move {
///     Ok(format!("Processed payload via RPC: {}", args.name))
/// });
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:5001").await?;
/// server.serve(listener).await?;
/// ```
#[derive(Default)]
pub struct RpcServer {
    procedures: HashMap<String, Arc<dyn Procedure>>,
}

impl RpcServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a procedure. Uses builder pattern; returns `self` for chaining.
    pub fn procedure<P: Procedure + 'static>(mut self, name: &str, procedure: P) -> Self {
        self.procedures.insert(name.to_string(), Arc::new(procedure));
        self
    }

    /// Serve forever on `listener`, one task per connection.
    pub async fn serve(self, listener: TcpListener) -> io::Result<()> {
        let procedures = Arc::new(self.procedures);
        loop {
            let (stream, peer) = listener.accept().await?;
            let procedures = Arc::clone(&procedures);
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, &procedures).await {
                    tracing::debug!(%peer, error = %e, "rpc connection ended with error");
                }
            });
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    procedures: &HashMap<String, Arc<dyn Procedure>>,
) -> io::Result<()> {
    while let Some(call) = read_frame::<_, RpcCall>(&mut stream).await? {
        let result = match procedures.get(&call.method) {
            Some(procedure) => procedure.call(call.args).await,
            None => Err(format!("rpc: can't find method {}", call.method)),
        };
        write_frame(&mut stream, &RpcReply { result }).await?;
    }
    Ok(())
}

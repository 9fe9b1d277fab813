//! server: axum surfaces for the dispatcher and the consumer.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use switchboard::{server, DecodeOptions, Dispatcher};
//!
//! let app = server::router(Arc::new(dispatcher), DecodeOptions::default());
//! server::serve(app, "0.0.0.0:8080".parse()?, shutdown).await?;
//! ```

mod health;
mod http;

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;

pub use health::health_router;
pub use http::router;

/// Serve `app` at `addr` until `shutdown` resolves.
pub async fn serve<S>(app: Router, addr: SocketAddr, shutdown: S) -> Result<(), std::io::Error>
where
    S: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "http server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

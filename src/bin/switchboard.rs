use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use switchboard::adapter::TransportKind;
use switchboard::{broker, server, Config, DecodeOptions, Dispatcher, RouteTable};

/// Action router: accepts action envelopes over HTTP and forwards each one
/// to its downstream capability over HTTP, binary RPC, gRPC, or the topic
/// exchange.
#[derive(Parser)]
#[command(name = "switchboard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Protocol-multiplexing action router", long_about = None)]
struct Cli {
    /// TOML config file. Built-in defaults are used when omitted.
    #[arg(short, long, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> switchboard::Result<()> {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(cli.config.as_deref())?;

    // Only the publish route needs the broker; skip the connection otherwise.
    let connection = match config.routes.log_transport {
        TransportKind::Publish => Some(broker::connect(&config.broker.url).await?),
        _ => None,
    };

    let routes = RouteTable::from_config(&config, connection.clone())?;
    let mut dispatcher = Dispatcher::new(routes);
    if cfg!(feature = "grpc") {
        let grpc = switchboard::dispatch::grpc_logger(&config.targets)?;
        dispatcher = dispatcher.with_grpc_logger(grpc);
    }
    tracing::info!(
        routes = ?dispatcher.routes().actions(),
        log_transport = %config.routes.log_transport,
        "starting router"
    );

    let decode = DecodeOptions::default().with_max_size(config.server.max_body_bytes);
    let app = server::router(Arc::new(dispatcher), decode);
    server::serve(app, config.server.bind, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
    })
    .await?;

    if let Some(connection) = connection {
        connection.close().await?;
    }
    Ok(())
}

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use reqwest::Url;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use switchboard::adapter::{Adapter, HttpAdapter};
use switchboard::{broker, server, Config, ConfigError, Consumer, ConsumerOptions, Topology};

/// Topic listener: consumes the event exchange and forwards each message to
/// the logging capability.
#[derive(Parser)]
#[command(name = "switchboard-listener")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Topic-exchange consumer", long_about = None)]
struct Cli {
    /// TOML config file. Built-in defaults are used when omitted.
    #[arg(short, long, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,
}

fn stopped(mut rx: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> switchboard::Result<()> {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(cli.config.as_deref())?;

    let logger_url = Url::parse(&config.targets.logger_url).map_err(|e| {
        ConfigError::Invalid(format!("targets.logger_url '{}': {e}", config.targets.logger_url))
    })?;
    let forwarder: Arc<dyn Adapter> = Arc::new(HttpAdapter::new(logger_url));

    let connection = broker::connect(&config.broker.url).await?;
    let consumer = Consumer::new(
        Arc::clone(&connection),
        Topology::new(config.broker.exchange.clone()),
        forwarder,
        ConsumerOptions {
            ack_mode: config.consumer.ack_mode,
            concurrency: config.consumer.concurrency(),
        },
    )
    .await?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);
    {
        let stop_tx = Arc::clone(&stop_tx);
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
            let _ = stop_tx.send(true);
        });
    }

    let health = tokio::spawn(server::serve(
        server::health_router(consumer.health()),
        config.consumer.health_bind,
        stopped(stop_rx.clone()),
    ));

    let report = consumer
        .listen(&config.consumer.topics, stopped(stop_rx))
        .await?;
    tracing::info!(
        received = report.received,
        forwarded = report.forwarded,
        failed = report.failed,
        "listener finished"
    );

    // The delivery stream can end without a signal; stop the health server too.
    let _ = stop_tx.send(true);

    match health.await {
        Ok(result) => result?,
        Err(e) => tracing::error!(error = %e, "health server task failed"),
    }
    connection.close().await?;
    Ok(())
}

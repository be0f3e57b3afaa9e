//! wattrelay daemon
//!
//! Receives encrypted reading batches from a remote power meter over
//! UDP, answers its time-sync handshake, and republishes accepted
//! readings on the local multicast telemetry bus.

use anyhow::Result;
use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use wattrelay_daemon::config::RelayConfig;
use wattrelay_daemon::metrics;
use wattrelay_daemon::relay::Relay;

/// Power meter relay daemon
#[derive(Parser, Debug)]
#[command(name = "wattrelayd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "wattrelay.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("wattrelay daemon v{}", env!("CARGO_PKG_VERSION"));

    let config = RelayConfig::load(&args.config).await?;
    info!("Loaded configuration from {}", args.config);

    let metrics_handle = metrics::start_server(&config.monitoring);

    let relay = Relay::bind(&config).await?;
    info!(
        "Listening on {}, publishing to {}",
        relay.local_addr()?,
        config.bus.group
    );

    let result = relay.run().await;

    metrics_handle.abort();
    result
}

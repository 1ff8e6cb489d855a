//! Lobby Daemon - party lobby and queue-channel reconciler
//!
//! The lobby daemon provides:
//! - Party and invite lifecycle with write-through JSON persistence
//! - Debounced splitting of settled queue channels
//! - Idle party and expired invite sweeps
//! - A JSON-line console on stdin/stdout against a simulated platform

use clap::Parser;
use lobby_daemon::{DaemonConfig, DaemonResult, Server};
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Lobby Daemon CLI
#[derive(Parser)]
#[command(name = "lobbyd")]
#[command(about = "Lobby Daemon - party lifecycle and queue-channel reconciler", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "LOBBY_CONFIG")]
    config: Option<String>,

    /// Directory holding the party and linked-account files
    #[arg(short, long, env = "LOBBY_DATA_DIR")]
    data_dir: Option<String>,

    /// Log level
    #[arg(long, env = "LOBBY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "LOBBY_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())?;

    // Override with CLI args
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir.into();
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing; stdout carries console output
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting lobby daemon");

    // Create and run server
    let server = Server::new(config).await?;
    server
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
}

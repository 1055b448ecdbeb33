use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use miniqueue::QueueConfig;

/// Durable single-node message queue server
#[derive(Parser, Debug)]
#[command(name = "miniqueued", version, about)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Directory for the durable store
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Delayed-partition sweep cadence in seconds
    #[arg(long)]
    sweep_interval: Option<u64>,

    /// Dead-letter a value after this many nacks
    #[arg(long)]
    max_nacks: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => QueueConfig::load(path)?,
        None => QueueConfig::default(),
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(seconds) = cli.sweep_interval {
        config.sweep_interval_secs = seconds;
    }
    if let Some(max_nacks) = cli.max_nacks {
        config.max_nacks = Some(max_nacks);
    }

    miniqueue::server::start(config).await?;
    Ok(())
}

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use taskboard_relay::{DeliveryPolicy, RelayConfig, spawn_relay};

#[derive(Parser, Debug)]
#[command(author, version, about = "taskboard direct-message relay")]
struct Args {
    /// TOML file with relay settings; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    listen: Option<SocketAddr>,
    /// Liveness sweep period.
    #[arg(long)]
    ping_interval_ms: Option<u64>,
    #[arg(long)]
    max_connections: Option<usize>,
    #[arg(long)]
    max_frame_bytes: Option<usize>,
    /// Outbound frames buffered per connection.
    #[arg(long)]
    queue_capacity: Option<usize>,
    /// broadcast | pair
    #[arg(long)]
    delivery: Option<DeliveryPolicy>,
    /// Allowed CORS origin for /health (repeatable, `*` for any).
    #[arg(long = "allow-origin")]
    allow_origins: Vec<String>,
}

impl Args {
    fn into_config(self) -> Result<RelayConfig> {
        let mut config = RelayConfig::load(self.config.as_deref())?;
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(ms) = self.ping_interval_ms {
            config.ping_interval_ms = ms;
        }
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }
        if let Some(max) = self.max_frame_bytes {
            config.max_frame_bytes = max;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(delivery) = self.delivery {
            config.delivery = delivery;
        }
        if !self.allow_origins.is_empty() {
            config.allow_origins = self.allow_origins;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskboard_relay=info".into()),
        )
        .init();

    let config = Args::parse().into_config()?;
    let relay = spawn_relay(config).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down...");
    relay.shutdown().await
}

//! Keyring server binary entrypoint.

use clap::Parser;
use custody_core::config::KeyringConfig;
use keyring_server::{KeyringServer, ServerConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Expose custody-held accounts to a wallet as asynchronous signing accounts.
#[derive(Debug, Parser)]
#[command(name = "keyring-server", version)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "KEYRING_LISTEN_ADDR")]
    listen: Option<String>,

    /// Keyring state file.
    #[arg(long, env = "KEYRING_STATE_PATH")]
    state_path: Option<PathBuf>,

    /// Seconds between polls of pending requests.
    #[arg(long, env = "POLL_INTERVAL_SECS")]
    poll_interval: Option<u64>,

    /// Start with enhanced mode on.
    #[arg(long)]
    enhanced_mode: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "keyring_server=debug,signing_engine=debug,custody_core=info,tower_http=debug".into());
    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mut keyring = KeyringConfig::from_env()?;
    if let Some(interval) = args.poll_interval {
        keyring.poller.interval_secs = interval;
    }
    if args.enhanced_mode {
        keyring.enhanced_mode.enabled = true;
    }
    keyring.validate()?;

    let mut server = ServerConfig::from_env();
    if let Some(listen) = args.listen {
        server.listen_addr = listen;
    }
    if let Some(state_path) = args.state_path {
        server.state_path = state_path;
    }

    KeyringServer::new(server, keyring).await?.run().await
}

//! Keygate - split-trust custody gateway for Solana wallet keys

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keygate::{config::Args, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("keygate={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Keygate - split-trust wallet custody");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("KDF workers: {}", args.kdf_worker_count);
    info!("KDF queue: {}", args.kdf_max_queue_size);
    info!("Pending recovery TTL: {}s", args.pending_recovery_ttl_secs);
    info!("======================================");

    let state = Arc::new(server::AppState::new(args));

    server::run(state).await?;

    Ok(())
}

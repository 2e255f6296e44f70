//! Configuration for Keygate
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Keygate - split-trust custody gateway for Solana wallet keys
#[derive(Parser, Debug, Clone)]
#[command(name = "keygate")]
#[command(about = "Split-trust custody service for Solana wallet signing keys")]
pub struct Args {
    /// Unique node identifier for this gateway instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Number of KDF worker tasks
    #[arg(long, env = "KDF_WORKER_COUNT", default_value = "2")]
    pub kdf_worker_count: usize,

    /// Maximum queued KDF requests before rejecting with 503
    #[arg(long, env = "KDF_MAX_QUEUE_SIZE", default_value = "256")]
    pub kdf_max_queue_size: usize,

    /// Per-request KDF timeout in milliseconds
    #[arg(long, env = "KDF_REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub kdf_request_timeout_ms: u64,

    /// Lifetime of staged recovery material in seconds (default 7 days)
    #[arg(long, env = "PENDING_RECOVERY_TTL_SECS", default_value = "604800")]
    pub pending_recovery_ttl_secs: i64,

    /// Interval between expired-recovery sweeps in seconds
    #[arg(long, env = "RECOVERY_CLEANUP_INTERVAL_SECS", default_value = "3600")]
    pub recovery_cleanup_interval_secs: u64,
}

impl Args {
    /// Validate configuration after parsing.
    pub fn validate(&self) -> Result<(), String> {
        if self.kdf_worker_count == 0 {
            return Err("KDF_WORKER_COUNT must be at least 1".to_string());
        }

        if self.kdf_max_queue_size == 0 {
            return Err("KDF_MAX_QUEUE_SIZE must be at least 1".to_string());
        }

        if self.pending_recovery_ttl_secs <= 0 {
            return Err("PENDING_RECOVERY_TTL_SECS must be positive".to_string());
        }

        if self.recovery_cleanup_interval_secs == 0 {
            return Err("RECOVERY_CLEANUP_INTERVAL_SECS must be at least 1".to_string());
        }

        Ok(())
    }
}

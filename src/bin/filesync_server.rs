//!
//! filesync server binary
//! ----------------------
//! Command-line entry point for the filesync HTTP server. Configuration comes
//! from CLI flags and environment variables.

use anyhow::Result;
use std::env;

use filesync::config::{self, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let args: Vec<String> = env::args().collect();
    if config::wants_help(&args) {
        println!("{}", config::USAGE);
        return Ok(());
    }

    let cfg = ServerConfig::from_env_and_args(&args);
    println!(
        "filesync starting: http={}, data_root={}, backup_interval_secs={}",
        cfg.http_port, cfg.data_root.display(), cfg.backup_interval_secs
    );
    tracing::info!(target: "startup", "Using port: http={}, data_root={}", cfg.http_port, cfg.data_root.display());
    filesync::server::run(cfg).await
}

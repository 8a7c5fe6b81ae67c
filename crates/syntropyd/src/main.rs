//! Syntropy daemon - validates hosts and bootstraps node manager setups.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use syntropyd::config::{Config, CONFIG_PATH};
use syntropyd::server::{self, AppState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "syntropyd")]
#[command(about = "Syntropy node bootstrap daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the daemon config (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(|| PathBuf::from(CONFIG_PATH));
    let loaded = Config::load_from_path(&path);
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Syntropy daemon v{} starting", env!("CARGO_PKG_VERSION"));
    match &loaded {
        Ok(_) => info!("Loaded config from {}", path.display()),
        Err(e) => warn!("Config not loaded from {}, using defaults: {:#}", path.display(), e),
    }
    info!("State directory: {}", config.state_dir.display());

    let state = AppState::new(&config);
    server::run(&config, state).await
}

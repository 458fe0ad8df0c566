use anyhow::Result;
use colored::Colorize;
use power_logger::{config, server};
use std::path::Path;
use tracing::info;

/// Execute the start command
///
/// Loads the configuration and runs the server until a shutdown signal.
pub async fn execute(config_path: &Path) -> Result<()> {
    let cfg = config::load_config(config_path)?;

    println!("{}", "Starting power logger...".green());
    println!("  {}: {}", "Log file".cyan(), cfg.store.path.display());
    println!("  {}: {}:{}", "Listening".cyan(), cfg.server.host, cfg.server.port);
    info!(config = %config_path.display(), "Starting power logger");

    server::start_server(cfg).await
}

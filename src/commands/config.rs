use anyhow::Result;
use colored::Colorize;
use power_logger::config;
use std::path::Path;
use tracing::info;

/// Execute the config show command
///
/// Prints the effective configuration: file values, env overrides and defaults merged
pub fn show(config_path: &Path) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());
    info!("Loading configuration for display");

    let cfg = config::load_config(config_path)?;

    println!("{}", "Current Configuration:".green().bold());
    println!();
    println!("{}", toml::to_string_pretty(&cfg)?);

    Ok(())
}

/// Execute the config validate command
pub fn validate(config_path: &Path) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());
    info!("Validating configuration file");

    let cfg = config::load_config(config_path)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  {}: {}:{}", "Server".cyan(), cfg.server.host, cfg.server.port);
    println!("  {}: {}", "Log file".cyan(), cfg.store.path.display());
    println!("  {}: {} bytes", "Page size".cyan(), cfg.store.page_size);
    println!("  {}: {}", "Queue capacity".cyan(), cfg.store.queue_capacity);
    println!("  {}: {}s", "Flush interval".cyan(), cfg.scheduler.flush_interval_secs);
    println!("  {}: {} bytes", "Query chunk".cyan(), cfg.query.chunk_size);
    println!(
        "  {}: {}",
        "Metrics".cyan(),
        if cfg.metrics.enabled {
            cfg.metrics.endpoint.green()
        } else {
            "disabled".red()
        }
    );

    info!("Configuration validation successful");
    Ok(())
}

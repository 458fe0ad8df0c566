use anyhow::{bail, Result};
use colored::Colorize;
use power_logger::{config, store::LogStore};
use std::io::{BufRead, Write};
use std::path::Path;

/// Execute the reset command
///
/// Deletes the log file after confirmation. Refuses while another process,
/// such as a running server, has the file open through the store.
pub async fn execute(config_path: &Path, yes: bool) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    let store = LogStore::new(&cfg.store);

    if !store.exists() {
        println!("{}", "No log file to delete".dimmed());
        return Ok(());
    }

    if !yes && !confirm(&format!("Delete {}? [y/N] ", cfg.store.path.display()))? {
        bail!("Reset cancelled");
    }

    store.reset().await?;
    println!("{} {}", "✓ Deleted".green(), cfg.store.path.display());
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt.yellow());
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

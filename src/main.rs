use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use power_logger::{config, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // Commands load the config themselves; a broken file still gets default logging
    let logging = config::load_config(&args.config)
        .map(|cfg| cfg.logging)
        .unwrap_or_default();
    init_tracing(&logging);

    match args.get_command() {
        cli::Commands::Start => {
            commands::start::execute(&args.config).await?;
        }
        cli::Commands::Check { repair } => {
            commands::check::execute(&args.config, repair)?;
        }
        cli::Commands::Query { from, until, chunk_size } => {
            commands::query::execute(&args.config, from, until, chunk_size).await?;
        }
        cli::Commands::Reset { yes } => {
            commands::reset::execute(&args.config, yes).await?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&args.config)?,
            cli::ConfigCommands::Validate => commands::config::validate(&args.config)?,
        },
        cli::Commands::Version => {
            println!("Power Logger v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

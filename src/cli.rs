use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "power-logger", version, about = "Power telemetry logger")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start sampling and serve HTTP (default)
    Start,

    /// Inspect the log file, optionally repairing it
    Check {
        /// Run recovery instead of only reporting
        #[arg(long)]
        repair: bool,
    },

    /// Print logged rows as JSON
    Query {
        /// Start of the range in epoch seconds (default: everything)
        #[arg(long, default_value = "0")]
        from: i64,

        /// End of the range in epoch seconds, exclusive (0: open ended)
        #[arg(long, default_value = "0")]
        until: i64,

        /// Output chunk size in bytes
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Delete the log file
    Reset {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display the effective configuration
    Show,

    /// Validate configuration file
    Validate,
}

impl Cli {
    /// Get the command to execute, defaulting to Start if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Start)
    }
}

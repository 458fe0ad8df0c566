pub mod config;
pub mod error;
pub mod handlers;
pub mod live;
pub mod logdb;
pub mod logger;
pub mod metrics;
pub mod record;
pub mod sampler;
pub mod scheduler;
pub mod server;
pub mod signals;
pub mod store;

use config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` overrides the configured level. Can only be called once.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

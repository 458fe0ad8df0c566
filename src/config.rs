use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub scheduler: SchedulerConfig,
    pub query: QueryConfig,
    pub live: LiveConfig,
    pub sampler: SamplerConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "text" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Bytes per page for newly created logs; power of two in 512..=32768
    pub page_size: u32,
    pub queue_capacity: usize,
    pub flush_lock_timeout_secs: u64,
    pub query_lock_timeout_secs: u64,
    pub recover_lock_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/power.db"),
            page_size: 512,
            queue_capacity: 300,
            flush_lock_timeout_secs: 600,
            query_lock_timeout_secs: 10,
            recover_lock_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub flush_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { flush_interval_secs: 60 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryConfig {
    pub chunk_size: usize,
    /// Window used when a request leaves out `from`
    pub default_window_secs: i64,
    pub pad_chunks: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            default_window_secs: 3600,
            pad_chunks: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LiveConfig {
    pub ring_capacity: usize,
    /// Keep every n-th sample for replay
    pub replay_stride: u64,
    pub channel_capacity: usize,
    pub keep_alive_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 30,
            replay_stride: 1,
            channel_capacity: 64,
            keep_alive_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub interval_ms: u64,
    pub logging_enabled_default: bool,
    /// Where the logging flag survives restarts
    pub state_file: Option<PathBuf>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            logging_enabled_default: true,
            state_file: Some(PathBuf::from("data/logger-state.json")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "/metrics".to_string(),
        }
    }
}

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("POWER_LOGGER").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    let page_size = cfg.store.page_size;
    if !page_size.is_power_of_two() || !(512..=32768).contains(&page_size) {
        anyhow::bail!("store.page_size must be a power of two between 512 and 32768, got {}", page_size);
    }

    if cfg.store.queue_capacity == 0 {
        anyhow::bail!("store.queue_capacity must be at least 1");
    }

    if cfg.store.path.as_os_str().is_empty() {
        anyhow::bail!("store.path cannot be empty");
    }

    if cfg.scheduler.flush_interval_secs == 0 {
        anyhow::bail!("scheduler.flush_interval_secs must be at least 1");
    }

    // One row plus the closing bracket has to fit in a chunk
    if cfg.query.chunk_size < crate::record::ROW_MAX_JSON_SIZE + 1 {
        anyhow::bail!(
            "query.chunk_size must be at least {} bytes, got {}",
            crate::record::ROW_MAX_JSON_SIZE + 1,
            cfg.query.chunk_size
        );
    }

    if cfg.query.default_window_secs < 0 {
        anyhow::bail!("query.default_window_secs cannot be negative");
    }

    if cfg.live.replay_stride == 0 {
        anyhow::bail!("live.replay_stride must be at least 1");
    }

    if cfg.sampler.interval_ms == 0 {
        anyhow::bail!("sampler.interval_ms must be at least 1");
    }

    match cfg.logging.format.as_str() {
        "text" | "json" => {}
        other => anyhow::bail!("logging.format must be \"text\" or \"json\", got \"{}\"", other),
    }

    if !cfg.metrics.endpoint.starts_with('/') {
        anyhow::bail!("metrics.endpoint must start with '/'");
    }

    Ok(())
}

//! The logging front end
//!
//! Accepts samples from the sampler, routes them to the write queue and the
//! live feed, and carries the operator controls: the persisted logging flag,
//! manual flush and manual reset.

use crate::live::LiveFeed;
use crate::record::Record;
use crate::scheduler::FlushTrigger;
use crate::store::{LogStore, StoreError};
use anyhow::Context;
use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct PersistedState {
    logging_enabled: bool,
}

/// Snapshot for `/status` and the CLI
#[derive(Debug, Clone, Serialize)]
pub struct LoggerStatus {
    pub logging_enabled: bool,
    pub accessible: bool,
    pub file_exists: bool,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub live_subscribers: usize,
    pub latest: Option<Record>,
}

pub struct DataLogger {
    store: Arc<LogStore>,
    live: Arc<LiveFeed>,
    flush: FlushTrigger,
    logging_enabled: AtomicBool,
    state_file: Option<PathBuf>,
    latest: ArcSwapOption<Record>,
    replay_stride: u64,
    samples_seen: AtomicU64,
}

impl DataLogger {
    /// Build the logger, restoring the logging flag from `state_file`.
    ///
    /// Logging only starts enabled when the store recovered successfully, so
    /// call this after [`LogStore::recover`].
    pub fn new(
        store: Arc<LogStore>,
        live: Arc<LiveFeed>,
        flush: FlushTrigger,
        state_file: Option<PathBuf>,
        default_enabled: bool,
        replay_stride: u64,
    ) -> Self {
        let persisted = state_file
            .as_deref()
            .and_then(|path| match load_state(path) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable logger state");
                    None
                }
            })
            .map(|s| s.logging_enabled)
            .unwrap_or(default_enabled);

        let enabled = persisted && store.is_accessible();
        tracing::info!(logging_enabled = enabled, persisted, "Logger initialized");

        Self {
            store,
            live,
            flush,
            logging_enabled: AtomicBool::new(enabled),
            state_file,
            latest: ArcSwapOption::empty(),
            replay_stride: replay_stride.max(1),
            samples_seen: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<LogStore> {
        &self.store
    }

    pub fn live(&self) -> &Arc<LiveFeed> {
        &self.live
    }

    pub fn logging_enabled(&self) -> bool {
        self.logging_enabled.load(Ordering::SeqCst)
    }

    pub fn latest(&self) -> Option<Record> {
        self.latest.load_full().map(|r| *r)
    }

    /// Handle one fresh sample. Returns whether it was queued for persistence.
    pub fn observe(&self, record: Record) -> bool {
        self.latest.store(Some(Arc::new(record)));
        let seen = self.samples_seen.fetch_add(1, Ordering::Relaxed);
        if !self.logging_enabled() {
            return false;
        }
        self.add_record(record, seen % self.replay_stride == 0)
    }

    /// Publish a record to live subscribers and queue it for the next flush.
    pub fn add_record(&self, record: Record, keep_for_replay: bool) -> bool {
        self.live.publish(record, keep_for_replay);
        let queued = self.store.enqueue(record);
        if !queued {
            tracing::warn!(
                timestamp = record.timestamp,
                capacity = self.store.queue().capacity(),
                "Write queue full, sample dropped"
            );
        }
        queued
    }

    /// Flip the logging flag. Turning logging off flushes what is queued;
    /// turning it on only succeeds when the log file is accessible.
    pub fn toggle_logging(&self) -> bool {
        let was_enabled = self.logging_enabled();
        if was_enabled {
            self.flush.request_flush();
        }
        let enabled = !was_enabled && self.store.is_accessible();
        self.logging_enabled.store(enabled, Ordering::SeqCst);

        if let Some(path) = &self.state_file {
            if let Err(e) = save_state(path, PersistedState { logging_enabled: enabled }) {
                tracing::error!(path = %path.display(), error = %e, "Failed to persist logging flag");
            }
        }
        tracing::info!(logging_enabled = enabled, "Logging toggled");
        enabled
    }

    pub fn request_flush(&self) {
        tracing::info!(pending = self.store.queue().pending_count(), "Manual flush requested");
        self.flush.request_flush();
    }

    /// Delete the log file and everything queued.
    pub async fn reset(&self) -> Result<(), StoreError> {
        tracing::warn!(path = %self.store.path().display(), "Resetting log file");
        self.store.reset().await
    }

    pub fn status(&self) -> LoggerStatus {
        LoggerStatus {
            logging_enabled: self.logging_enabled(),
            accessible: self.store.is_accessible(),
            file_exists: self.store.exists(),
            queue_depth: self.store.queue().pending_count(),
            queue_capacity: self.store.queue().capacity(),
            live_subscribers: self.live.subscriber_count(),
            latest: self.latest(),
        }
    }
}

fn load_state(path: &Path) -> anyhow::Result<Option<PersistedState>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path).context("Failed to read logger state")?;
    let state = serde_json::from_str(&raw).context("Failed to parse logger state")?;
    Ok(Some(state))
}

fn save_state(path: &Path, state: PersistedState) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    std::fs::write(path, serde_json::to_vec(&state)?).context("Failed to write logger state")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    async fn logger(dir: &Path, default_enabled: bool, stride: u64) -> DataLogger {
        let store = Arc::new(LogStore::new(&StoreConfig {
            path: dir.join("power.db"),
            queue_capacity: 4,
            ..StoreConfig::default()
        }));
        store.recover().await;
        DataLogger::new(
            store,
            Arc::new(LiveFeed::new(5, 16)),
            FlushTrigger::new(),
            Some(dir.join("state.json")),
            default_enabled,
            stride,
        )
    }

    #[tokio::test]
    async fn test_disabled_logger_only_tracks_latest() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(dir.path(), false, 1).await;

        assert!(!logger.observe(Record::new(5, 1.0, 2.0)));
        assert_eq!(logger.latest().map(|r| r.timestamp), Some(5));
        assert_eq!(logger.status().queue_depth, 0);
        assert_eq!(logger.live().replay_len(), 0);
    }

    #[tokio::test]
    async fn test_replay_stride_thins_ring() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(dir.path(), true, 2).await;

        for ts in 0..4 {
            logger.observe(Record::new(ts, 0.0, 0.0));
        }
        let replay: Vec<i64> = logger.live().attach().replay.iter().map(|r| r.timestamp).collect();
        assert_eq!(replay, vec![0, 2]);
        assert_eq!(logger.status().queue_depth, 4);
        assert!(!logger.observe(Record::new(4, 0.0, 0.0)));
    }

    #[tokio::test]
    async fn test_toggle_persists_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let first = logger(dir.path(), true, 1).await;
        assert!(first.logging_enabled());
        assert!(!first.toggle_logging());

        let second = logger(dir.path(), true, 1).await;
        assert!(!second.logging_enabled());
        assert!(second.toggle_logging());
    }

    #[tokio::test]
    async fn test_toggle_refuses_when_inaccessible() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("power.db"), b"corrupt").unwrap();
        let logger = logger(dir.path(), true, 1).await;

        assert!(!logger.logging_enabled());
        assert!(!logger.toggle_logging());

        logger.reset().await.unwrap();
        assert!(logger.toggle_logging());
    }
}

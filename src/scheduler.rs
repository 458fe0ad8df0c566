//! Background flush thread
//!
//! Flushes the store every interval, or earlier when woken. Wakes that arrive
//! while a flush is running collapse into a single follow-up flush.

use crate::store::LogStore;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};

/// Cheap handle for asking the scheduler to flush now
#[derive(Clone, Default)]
pub struct FlushTrigger {
    notify: Arc<Notify>,
}

impl FlushTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_flush(&self) {
        self.notify.notify_one();
    }

    async fn notified(&self) {
        self.notify.notified().await;
    }
}

pub struct FlushScheduler {
    trigger: FlushTrigger,
    shutdown: watch::Sender<bool>,
    thread: Option<JoinHandle<()>>,
}

impl FlushScheduler {
    /// Start the flush thread on top of `runtime`.
    ///
    /// Failing to spawn the thread is returned to the caller; the server
    /// treats it as fatal.
    pub fn spawn(
        store: Arc<LogStore>,
        interval: Duration,
        trigger: FlushTrigger,
        runtime: Handle,
    ) -> std::io::Result<Self> {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let wake = trigger.clone();

        let thread = std::thread::Builder::new()
            .name("flush-scheduler".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    tracing::info!(interval_secs = interval.as_secs(), "Flush scheduler started");
                    loop {
                        tokio::select! {
                            _ = tokio::time::sleep(interval) => {
                                tracing::debug!("Flush interval elapsed");
                            }
                            _ = wake.notified() => {
                                tracing::debug!("Flush requested");
                            }
                            _ = shutdown_rx.changed() => {
                                break;
                            }
                        }
                        // errors are logged by the store
                        let _ = store.flush().await;
                    }

                    tracing::info!("Flush scheduler stopping, flushing remaining records");
                    let _ = store.flush().await;
                });
            })?;

        Ok(Self {
            trigger,
            shutdown,
            thread: Some(thread),
        })
    }

    pub fn trigger(&self) -> &FlushTrigger {
        &self.trigger
    }

    pub fn request_flush(&self) {
        self.trigger.request_flush();
    }

    /// Stop the thread after one last flush and wait for it.
    ///
    /// Blocks the calling thread; call it from outside the async context or
    /// through `spawn_blocking`.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Flush scheduler thread panicked");
            }
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        // stop the loop even when shutdown() was never called; the thread is detached
        let _ = self.shutdown.send(true);
    }
}

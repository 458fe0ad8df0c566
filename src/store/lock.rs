//! The single store lock
//!
//! Whoever holds a [`StoreGuard`] owns the log file handle and the page
//! scratch buffer. Dropping the guard is the only way to release the lock.

use super::StoreError;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Resources only the lock holder may touch
pub struct StoreResources {
    page_size: usize,
    scratch: Vec<u8>,
}

impl StoreResources {
    /// Lend out the page buffer, allocating it again if a failed operation lost it.
    pub fn take_scratch(&mut self) -> Vec<u8> {
        let mut buf = std::mem::take(&mut self.scratch);
        buf.resize(self.page_size, 0);
        buf
    }

    pub fn restore_scratch(&mut self, buf: Vec<u8>) {
        self.scratch = buf;
    }
}

/// Counts concurrent holders; the peak must never exceed one
#[derive(Debug, Default)]
pub struct LockProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
    acquisitions: AtomicU64,
}

impl LockProbe {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }
}

pub struct StoreLock {
    inner: Arc<Mutex<StoreResources>>,
    probe: Arc<LockProbe>,
}

impl StoreLock {
    pub fn new(page_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreResources {
                page_size,
                scratch: vec![0u8; page_size],
            })),
            probe: Arc::new(LockProbe::default()),
        }
    }

    pub fn probe(&self) -> &LockProbe {
        &self.probe
    }

    /// Acquire the lock, giving up after `wait` when one is given.
    pub async fn acquire(&self, wait: Option<Duration>, owner: &'static str) -> Result<StoreGuard, StoreError> {
        tracing::debug!(owner, "Acquiring store lock");
        let started = Instant::now();

        let guard = match wait {
            Some(wait) => tokio::time::timeout(wait, self.inner.clone().lock_owned())
                .await
                .map_err(|_| {
                    tracing::error!(owner, waited_ms = wait.as_millis() as u64, "Timeout acquiring store lock");
                    StoreError::LockTimeout { owner, waited: wait }
                })?,
            None => self.inner.clone().lock_owned().await,
        };

        crate::metrics::record_lock_wait("log_store", owner, started.elapsed());
        self.probe.enter();
        tracing::debug!(owner, "Store lock acquired");

        Ok(StoreGuard {
            guard,
            probe: self.probe.clone(),
            owner,
            acquired_at: Instant::now(),
        })
    }
}

pub struct StoreGuard {
    guard: OwnedMutexGuard<StoreResources>,
    probe: Arc<LockProbe>,
    owner: &'static str,
    acquired_at: Instant,
}

impl StoreGuard {
    #[cfg(test)]
    pub fn owner(&self) -> &'static str {
        self.owner
    }
}

impl Deref for StoreGuard {
    type Target = StoreResources;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for StoreGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl Drop for StoreGuard {
    fn drop(&mut self) {
        self.probe.exit();
        tracing::debug!(
            owner = self.owner,
            held_ms = self.acquired_at.elapsed().as_millis() as u64,
            "Store lock released"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_while_held() {
        let lock = StoreLock::new(512);
        let held = lock.acquire(None, "holder").await.unwrap();

        let err = lock
            .acquire(Some(Duration::from_millis(20)), "waiter")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::LockTimeout { owner: "waiter", .. }));

        drop(held);
        assert_eq!(lock.probe().current(), 0);
        assert!(lock.acquire(Some(Duration::from_millis(20)), "waiter").await.is_ok());
        assert_eq!(lock.probe().peak(), 1);
        assert_eq!(lock.probe().acquisitions(), 2);
    }

    #[tokio::test]
    async fn test_scratch_is_reallocated_when_lost() {
        let lock = StoreLock::new(1024);
        let mut guard = lock.acquire(None, "test").await.unwrap();
        let lost = guard.take_scratch();
        assert_eq!(lost.len(), 1024);
        drop(lost);

        assert_eq!(guard.take_scratch().len(), 1024);
        assert_eq!(guard.owner(), "test");
    }
}

//! Durable record store
//!
//! Owns the log file, the pending-record queue and the single lock that
//! serializes every operation touching the file: flush, recover, reset and
//! the whole lifetime of a history query.

mod lock;
mod query;
mod queue;

pub use lock::{LockProbe, StoreGuard, StoreResources};
pub use query::{QueryCursor, QueryOutcome, TimeRange};
pub use queue::RecordQueue;

use crate::config::StoreConfig;
use crate::logdb::{self, DbError, LogWriter, RecoveryReport, MIN_PAGE_SIZE};
use crate::record::{Record, COLUMN_COUNT};
use fs2::FileExt;
use lock::StoreLock;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("timed out after {waited:?} waiting for the store lock ({owner})")]
    LockTimeout { owner: &'static str, waited: Duration },

    #[error("log file is not accessible, reset it to resume logging")]
    Inaccessible,

    #[error("log file {0} is locked by another process")]
    FileBusy(PathBuf),

    #[error("cannot open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("failed to encode row: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("output buffer of {capacity} bytes cannot hold the next {needed} byte fragment")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("store task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Short label for metrics and API error types
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LockTimeout { .. } => "lock_timeout",
            Self::Inaccessible => "inaccessible",
            Self::FileBusy(_) => "file_busy",
            Self::Open { .. } => "open_failed",
            Self::Db(_) => "corrupt_log",
            Self::Encode(_) => "encode_failed",
            Self::BufferTooSmall { .. } => "buffer_too_small",
            Self::Task(_) => "task_failed",
            Self::Io(_) => "io_error",
        }
    }

    /// Whether the log file itself is damaged, as opposed to a transient failure
    pub fn needs_recovery(&self) -> bool {
        matches!(
            self,
            Self::Db(
                DbError::BadHeader
                    | DbError::InvalidPageSize(_)
                    | DbError::CorruptPage { .. }
                    | DbError::Truncated { .. }
            )
        )
    }
}

/// Result of one flush run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    pub appended: u64,
    /// Records still queued after the run
    pub remaining: usize,
    /// False when the queue was empty and the file was never touched
    pub ran: bool,
}

pub struct LogStore {
    path: PathBuf,
    page_size_exp: u8,
    lock: StoreLock,
    queue: Arc<RecordQueue>,
    accessible: AtomicBool,
    flush_lock_timeout: Duration,
    query_lock_timeout: Duration,
    recover_lock_timeout: Duration,
}

impl LogStore {
    pub fn new(config: &StoreConfig) -> Self {
        let page_size_exp = config.page_size.trailing_zeros() as u8;
        Self {
            path: config.path.clone(),
            page_size_exp,
            lock: StoreLock::new((1usize << page_size_exp).max(MIN_PAGE_SIZE as usize)),
            queue: Arc::new(RecordQueue::new(config.queue_capacity)),
            accessible: AtomicBool::new(false),
            flush_lock_timeout: Duration::from_secs(config.flush_lock_timeout_secs),
            query_lock_timeout: Duration::from_secs(config.query_lock_timeout_secs),
            recover_lock_timeout: Duration::from_secs(config.recover_lock_timeout_secs),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn queue(&self) -> &Arc<RecordQueue> {
        &self.queue
    }

    pub fn lock_probe(&self) -> &LockProbe {
        self.lock.probe()
    }

    pub fn is_accessible(&self) -> bool {
        self.accessible.load(Ordering::SeqCst)
    }

    /// Whether the log file is present. Does not take the lock.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Queue a record for the next flush; false when the queue is full.
    pub fn enqueue(&self, record: Record) -> bool {
        let accepted = self.queue.push(record);
        crate::metrics::record_sample(accepted);
        crate::metrics::set_queue_depth(self.queue.pending_count());
        accepted
    }

    /// Run a blocking file operation on the blocking pool with the lock held.
    ///
    /// The guard moves into the task and is released there, so the lock stays
    /// held until the file work is over even if the caller is cancelled.
    async fn with_resources<T, F>(guard: StoreGuard, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut StoreResources) -> Result<T, StoreError> + Send + 'static,
    {
        tokio::task::spawn_blocking(move || {
            let mut guard = guard;
            work(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Repair the log after an unclean shutdown and decide whether it is usable.
    ///
    /// A missing file counts as recovered. Returns the new accessibility state.
    pub async fn recover(&self) -> bool {
        let guard = match self.lock.acquire(Some(self.recover_lock_timeout), "recover").await {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!(error = %e, "Recovery could not take the store lock");
                self.accessible.store(false, Ordering::SeqCst);
                return false;
            }
        };

        let path = self.path.clone();
        let accessible = match Self::with_resources(guard, move |_| recover_file(&path)).await {
            Ok(None) => {
                tracing::info!(path = %self.path.display(), "No log file yet, nothing to recover");
                true
            }
            Ok(Some(report)) => {
                tracing::info!(
                    path = %self.path.display(),
                    page_size = report.page_size,
                    leaf_pages = report.leaf_pages,
                    rows = report.row_count,
                    adopted_pages = report.adopted_pages,
                    truncated_bytes = report.truncated_bytes,
                    "Log file recovered"
                );
                true
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Log file recovery failed");
                false
            }
        };

        self.accessible.store(accessible, Ordering::SeqCst);
        accessible
    }

    /// Move every queued record into the log file.
    ///
    /// Skips the file entirely when nothing is queued. The header is only
    /// rewritten when every append succeeded, so after a failed run the file
    /// resumes from its last finalized state. A damaged file marks the store
    /// inaccessible until it is reset.
    pub async fn flush(&self) -> Result<FlushReport, StoreError> {
        if self.queue.pending_count() == 0 {
            tracing::debug!("Queue is empty, skipping flush");
            return Ok(FlushReport::default());
        }
        if !self.is_accessible() {
            tracing::warn!(pending = self.queue.pending_count(), "Log file not accessible, records stay queued");
            return Err(StoreError::Inaccessible);
        }

        let started = Instant::now();
        let guard = self
            .lock
            .acquire(Some(self.flush_lock_timeout), "flush")
            .await
            .inspect_err(|e| crate::metrics::record_flush_error(e.kind()))?;

        let path = self.path.clone();
        let exp = self.page_size_exp;
        let queue = self.queue.clone();
        let result = Self::with_resources(guard, move |res| flush_queue(&path, exp, &queue, res)).await;

        let remaining = self.queue.pending_count();
        crate::metrics::set_queue_depth(remaining);
        match result {
            Ok(appended) => {
                crate::metrics::record_flush(appended, started.elapsed());
                tracing::info!(
                    appended,
                    remaining,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Flushed queued records"
                );
                Ok(FlushReport { appended, remaining, ran: true })
            }
            Err(e) => {
                crate::metrics::record_flush_error(e.kind());
                tracing::error!(error = %e, remaining, "Flush failed");
                if e.needs_recovery() {
                    self.accessible.store(false, Ordering::SeqCst);
                }
                Err(e)
            }
        }
    }

    /// Delete the log file and drop everything queued.
    ///
    /// Waits for the lock without a timeout, then marks the store accessible.
    /// Fails with [`StoreError::FileBusy`] while another process holds the file.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let guard = self.lock.acquire(None, "reset").await?;
        let path = self.path.clone();
        let queue = self.queue.clone();

        Self::with_resources(guard, move |_| {
            delete_file(&path)?;
            queue.clear();
            Ok(())
        })
        .await
        .inspect_err(|e| tracing::error!(path = %self.path.display(), error = %e, "Reset failed"))?;

        crate::metrics::set_queue_depth(0);
        self.accessible.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn open_exclusive(path: &Path) -> Result<File, StoreError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|source| StoreError::Open { path: path.to_path_buf(), source })?;
    FileExt::try_lock_exclusive(&file)
        .map_err(|_| StoreError::FileBusy(path.to_path_buf()))?;
    Ok(file)
}

/// Remove the log file while holding its exclusive advisory lock.
fn delete_file(path: &Path) -> Result<(), StoreError> {
    let file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => return Err(StoreError::Open { path: path.to_path_buf(), source }),
    };
    FileExt::try_lock_exclusive(&file)
        .map_err(|_| StoreError::FileBusy(path.to_path_buf()))?;

    std::fs::remove_file(path)?;
    tracing::info!(path = %path.display(), "Log file deleted");
    Ok(())
}

fn recover_file(path: &Path) -> Result<Option<RecoveryReport>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let mut file = open_exclusive(path)?;
    let page_size = logdb::read_page_size(&mut file)?;
    if page_size < MIN_PAGE_SIZE {
        return Err(DbError::InvalidPageSize(page_size).into());
    }
    Ok(Some(logdb::recover(&mut file)?))
}

fn flush_queue(
    path: &Path,
    page_size_exp: u8,
    queue: &RecordQueue,
    res: &mut StoreResources,
) -> Result<u64, StoreError> {
    let existed = path.exists();
    let file = open_exclusive(path)?;
    let scratch = res.take_scratch();
    let mut writer = if existed && file.metadata()?.len() > 0 {
        LogWriter::open_append(file, scratch)?
    } else {
        LogWriter::create(file, scratch, page_size_exp, COLUMN_COUNT)?
    };

    let mut outcome = Ok(());
    while let Some(record) = queue.drain_one() {
        if let Err(e) = writer.append_row(&record.to_values()) {
            outcome = Err(e);
            break;
        }
    }
    if outcome.is_ok() {
        outcome = writer.finalize();
    }

    let appended = writer.appended();
    res.restore_scratch(writer.into_buffer());
    outcome?;
    Ok(appended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn config(dir: &Path) -> StoreConfig {
        StoreConfig {
            path: dir.join("power.db"),
            page_size: 512,
            queue_capacity: 8,
            ..StoreConfig::default()
        }
    }

    #[tokio::test]
    async fn test_flush_empty_queue_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(&config(dir.path()));
        assert!(store.recover().await);

        let report = store.flush().await.unwrap();
        assert!(!report.ran);
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn test_flush_appends_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(&config(dir.path()));
        store.recover().await;

        store.enqueue(Record::new(1, 1.0, 2.0));
        store.enqueue(Record::new(2, 1.0, 2.0));
        assert_eq!(store.flush().await.unwrap().appended, 2);

        store.enqueue(Record::new(3, 1.0, 2.0));
        let report = store.flush().await.unwrap();
        assert_eq!(report.appended, 1);
        assert_eq!(report.remaining, 0);

        let mut file = File::open(store.path()).unwrap();
        let reader = logdb::LogReader::open(file.try_clone().unwrap(), Vec::new()).unwrap();
        assert_eq!(reader.header().row_count, 3);
        assert_eq!(logdb::read_page_size(&mut file).unwrap(), 512);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_inaccessible_until_reset() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(&config(dir.path()));
        std::fs::write(store.path(), b"definitely not a log file").unwrap();

        assert!(!store.recover().await);
        store.enqueue(Record::new(1, 0.0, 0.0));
        assert!(matches!(store.flush().await, Err(StoreError::Inaccessible)));
        assert_eq!(store.queue().pending_count(), 1);

        store.reset().await.unwrap();
        assert!(store.is_accessible());
        assert!(!store.exists());
        assert_eq!(store.queue().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_flush_into_damaged_file_marks_inaccessible() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(&config(dir.path()));
        store.recover().await;
        store.enqueue(Record::new(1, 0.0, 0.0));
        store.flush().await.unwrap();

        std::fs::write(store.path(), b"clobbered by something else").unwrap();
        store.enqueue(Record::new(2, 0.0, 0.0));
        let err = store.flush().await.unwrap_err();
        assert!(err.needs_recovery());
        assert!(!store.is_accessible());
    }

    #[tokio::test]
    async fn test_reset_refuses_file_held_by_another_store() {
        let dir = tempfile::tempdir().unwrap();
        let server = LogStore::new(&config(dir.path()));
        server.recover().await;
        server.enqueue(Record::new(1, 0.0, 0.0));
        server.flush().await.unwrap();

        let cursor = server.query(TimeRange::default()).await.unwrap();

        let cli = LogStore::new(&config(dir.path()));
        cli.enqueue(Record::new(2, 0.0, 0.0));
        let err = cli.reset().await.unwrap_err();
        assert!(matches!(err, StoreError::FileBusy(_)));
        assert!(cli.exists());
        assert_eq!(cli.queue().pending_count(), 1);
        assert!(!cli.is_accessible());

        drop(cursor);
        cli.reset().await.unwrap();
        assert!(!cli.exists());
        assert!(cli.is_accessible());
    }

    #[tokio::test]
    async fn test_flush_times_out_while_lock_held() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(&StoreConfig {
            flush_lock_timeout_secs: 0,
            ..config(dir.path())
        });
        store.recover().await;
        store.enqueue(Record::new(1, 0.0, 0.0));

        let held = store.lock.acquire(None, "test").await.unwrap();
        let err = store.flush().await.unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { owner: "flush", .. }));
        assert_eq!(store.queue().pending_count(), 1);
        drop(held);

        assert_eq!(store.flush().await.unwrap().appended, 1);
    }
}

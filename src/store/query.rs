//! History queries
//!
//! A query holds the store lock from the moment it opens the log until the
//! cursor is dropped, so its view of the file never changes underneath it.
//! Output is a JSON array of rows, produced in caller-sized chunks.

use super::{LogStore, StoreError, StoreGuard};
use crate::logdb::{ColumnValue, LogReader, RowRef};
use axum::body::Bytes;
use fs2::FileExt;
use futures::Stream;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Half-open time window in epoch seconds; `until == 0` means no upper bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub from: i64,
    pub until: i64,
}

impl TimeRange {
    pub fn new(from: i64, until: i64) -> Self {
        Self { from, until }
    }

    fn stops_before(&self, ts: i64) -> bool {
        self.until != 0 && ts >= self.until
    }
}

pub enum QueryOutcome {
    /// No log file exists; nothing was opened and the lock is already released
    Empty,
    Streaming(QueryCursor),
}

impl LogStore {
    /// Open a cursor over `range`, taking the store lock for its whole lifetime.
    pub async fn query(&self, range: TimeRange) -> Result<QueryOutcome, StoreError> {
        if !self.is_accessible() {
            return Err(StoreError::Inaccessible);
        }

        let guard = self
            .lock
            .acquire(Some(self.query_lock_timeout), "query")
            .await
            .inspect_err(|e| crate::metrics::record_query(e.kind()))?;
        if !self.exists() {
            tracing::debug!(from = range.from, until = range.until, "No log file, empty result");
            crate::metrics::record_query("empty");
            return Ok(QueryOutcome::Empty);
        }

        let path = self.path.clone();
        let cursor = tokio::task::spawn_blocking(move || QueryCursor::open(guard, &path, range))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
            .inspect_err(|e| crate::metrics::record_query(e.kind()))?;

        crate::metrics::record_query("streaming");
        Ok(QueryOutcome::Streaming(cursor))
    }
}

pub struct QueryCursor {
    reader: Option<LogReader>,
    guard: StoreGuard,
    range: TimeRange,
    last_timestamp: Option<i64>,
    rows_emitted: u64,
    finished: bool,
    pad: bool,
    row: Vec<u8>,
}

impl QueryCursor {
    fn open(mut guard: StoreGuard, path: &Path, range: TimeRange) -> Result<Self, StoreError> {
        let file = File::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        FileExt::try_lock_shared(&file)
            .map_err(|_| StoreError::FileBusy(path.to_path_buf()))?;

        let mut reader = LogReader::open(file, guard.take_scratch())?;
        tracing::debug!(
            page_size = reader.page_size(),
            last_leaf_page = reader.header().last_leaf_page,
            rows = reader.header().row_count,
            from = range.from,
            until = range.until,
            "Opened log for query"
        );
        reader.seek_at_or_after(range.from)?;

        Ok(Self {
            reader: Some(reader),
            guard,
            range,
            last_timestamp: None,
            rows_emitted: 0,
            finished: false,
            pad: false,
            row: Vec::with_capacity(crate::record::ROW_MAX_JSON_SIZE),
        })
    }

    /// Fill every chunk up to its full length with spaces while rows remain.
    pub fn with_padding(mut self, pad: bool) -> Self {
        self.pad = pad;
        self
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn rows_emitted(&self) -> u64 {
        self.rows_emitted
    }

    /// Timestamp of the last row written out
    pub fn last_timestamp(&self) -> Option<i64> {
        self.last_timestamp
    }

    /// Write the next chunk of the JSON array into `buf`.
    ///
    /// `offset` is the number of bytes produced so far; the opening bracket is
    /// only written at offset 0. Only whole rows are written. Returns the byte
    /// count, and 0 once the closing bracket has been produced.
    pub fn produce(&mut self, buf: &mut [u8], offset: usize) -> Result<usize, StoreError> {
        if self.finished {
            return Ok(0);
        }
        let result = self.fill(buf, offset);
        if result.is_err() {
            self.finished = true;
        }
        result
    }

    fn fill(&mut self, buf: &mut [u8], offset: usize) -> Result<usize, StoreError> {
        let Some(reader) = self.reader.as_mut() else {
            self.finished = true;
            return Ok(0);
        };

        let mut written = 0;
        let mut first = offset == 0;
        let needed = loop {
            let done = reader.is_exhausted() || self.range.stops_before(reader.timestamp()?);
            if done {
                let closing: &[u8] = if first { b"[]" } else { b"]" };
                if written + closing.len() > buf.len() {
                    break closing.len();
                }
                buf[written..written + closing.len()].copy_from_slice(closing);
                self.finished = true;
                return Ok(written + closing.len());
            }

            self.row.clear();
            self.row.push(if first { b'[' } else { b',' });
            render_row(&reader.current_row()?, &mut self.row)?;
            if written + self.row.len() > buf.len() {
                break self.row.len();
            }

            buf[written..written + self.row.len()].copy_from_slice(&self.row);
            written += self.row.len();
            first = false;
            self.last_timestamp = Some(reader.timestamp()?);
            self.rows_emitted += 1;
            reader.advance()?;
        };

        if written == 0 {
            return Err(StoreError::BufferTooSmall {
                needed,
                capacity: buf.len(),
            });
        }
        if self.pad {
            buf[written..].fill(b' ');
            written = buf.len();
        }
        Ok(written)
    }

    /// Stream the whole result in chunks of `chunk_size` bytes.
    ///
    /// Each chunk is produced on the blocking pool. Dropping the stream drops
    /// the cursor and releases the store lock.
    pub fn into_stream(self, chunk_size: usize) -> impl Stream<Item = Result<Bytes, StoreError>> + Send {
        futures::stream::unfold(Some((self, 0usize)), move |state| async move {
            let (mut cursor, offset) = state?;
            let step = tokio::task::spawn_blocking(move || {
                let mut buf = vec![0u8; chunk_size];
                let result = cursor.produce(&mut buf, offset);
                (cursor, buf, result)
            })
            .await;

            match step {
                Ok((cursor, mut buf, Ok(n))) if n > 0 => {
                    buf.truncate(n);
                    Some((Ok(Bytes::from(buf)), Some((cursor, offset + n))))
                }
                Ok((_, _, Ok(_))) => None,
                Ok((_, _, Err(e))) => {
                    tracing::error!(error = %e, "Query aborted mid-stream");
                    Some((Err(e), None))
                }
                Err(e) => Some((Err(StoreError::Task(e.to_string())), None)),
            }
        })
    }
}

impl Drop for QueryCursor {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            self.guard.restore_scratch(reader.into_buffer());
        }
        tracing::debug!(
            rows = self.rows_emitted,
            finished = self.finished,
            "Query cursor closed"
        );
    }
}

/// Append one row as a JSON array.
///
/// Text becomes a JSON string, blobs a quoted lowercase hex string, and
/// non-finite reals `null`. Reals that hold an exact `f32` (every sampled
/// measurement) are printed with the shortest `f32` digits.
fn render_row(row: &RowRef<'_>, out: &mut Vec<u8>) -> Result<(), StoreError> {
    out.push(b'[');
    for (idx, column) in row.columns().enumerate() {
        let (_, value) = column?;
        if idx > 0 {
            out.push(b',');
        }
        match value {
            ColumnValue::Null => out.extend_from_slice(b"null"),
            ColumnValue::Int(v) => write!(out, "{}", v)?,
            ColumnValue::Real(v) => {
                let narrow = v as f32;
                if narrow as f64 == v {
                    serde_json::to_writer(&mut *out, &narrow)?
                } else {
                    serde_json::to_writer(&mut *out, &v)?
                }
            }
            ColumnValue::Text(bytes) => {
                serde_json::to_writer(&mut *out, &String::from_utf8_lossy(bytes))?
            }
            ColumnValue::Blob(bytes) => {
                out.push(b'"');
                for byte in bytes {
                    write!(out, "{:02x}", byte)?;
                }
                out.push(b'"');
            }
        }
    }
    out.push(b']');
    Ok(())
}

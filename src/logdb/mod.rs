//! Page-structured append-only row log
//!
//! The store treats this module as a black box with a small call contract:
//!
//! - [`LogWriter::create`] / [`LogWriter::open_append`] / [`LogWriter::append_row`] /
//!   [`LogWriter::finalize`] for the write path
//! - [`LogReader::open`] / [`LogReader::seek_at_or_after`] / [`LogReader::current_row`] /
//!   [`LogReader::advance`] for the read path
//! - [`read_page_size`] and [`recover`] for crash recovery
//!
//! ## File layout
//!
//! ```text
//! page 0        header (magic, page size, column count, last leaf page, row count, crc)
//! page 1..=N    leaf pages, each holding whole rows and its own crc
//! ```
//!
//! Every row append rewrites exactly one leaf page and syncs it, so a row is
//! either fully committed or absent. Pages at or below the last leaf page in
//! the header are never written again: each write context and each finalize
//! starts a fresh page. The header is only rewritten by [`LogWriter::finalize`]
//! and [`recover`]; readers never look past the last leaf page recorded there.

pub(crate) mod format;
mod reader;
mod recover;
mod value;
mod writer;

pub use format::{FileHeader, MAX_PAGE_SIZE_EXP, MIN_PAGE_SIZE, MIN_PAGE_SIZE_EXP};
pub use reader::{LogReader, RowRef};
pub use recover::{read_page_size, recover, RecoveryReport};
pub use value::{column_type, derive_data_len, ColumnValue, OwnedValue};
pub use writer::LogWriter;

use thiserror::Error;

/// Errors raised by the row log
#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file header is missing or damaged")]
    BadHeader,

    #[error("invalid page size {0} (must be a power of two between 512 and 32768)")]
    InvalidPageSize(u32),

    #[error("page {page} is corrupt: {reason}")]
    CorruptPage { page: u32, reason: &'static str },

    #[error("unsupported column type {0}")]
    UnsupportedColumnType(u32),

    #[error("row of {len} bytes does not fit a page (max {max})")]
    RowTooLarge { len: usize, max: usize },

    #[error("row has {got} columns, file expects {expected}")]
    ColumnCountMismatch { expected: u8, got: usize },

    #[error("file has {found} leaf pages recorded but only {available} on disk")]
    Truncated { found: u32, available: u32 },
}

pub type Result<T> = std::result::Result<T, DbError>;

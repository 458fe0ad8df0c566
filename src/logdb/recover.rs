use super::format::{self, leaf_row_count, leaf_validate, FileHeader};
use super::{DbError, Result};
use std::fs::File;

/// What [`recover`] changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryReport {
    pub page_size: usize,
    /// Leaf pages committed after recovery
    pub leaf_pages: u32,
    pub row_count: u64,
    /// Valid pages found past the old header state and adopted
    pub adopted_pages: u32,
    /// Bytes cut from the end of the file (torn or invalid pages)
    pub truncated_bytes: u64,
}

/// Page size recorded in the header, or 0 when the header is unreadable.
pub fn read_page_size(file: &mut File) -> Result<u32> {
    match format::read_header(file) {
        Ok(header) => Ok(1u32.checked_shl(header.page_size_exp as u32).unwrap_or(0)),
        Err(DbError::BadHeader) => Ok(0),
        Err(e) => Err(e),
    }
}

/// Bring a log left behind by an unclean shutdown back to a consistent state.
///
/// Scans leaf pages from the start, keeps the longest run of valid pages,
/// truncates everything after it and rewrites the header to match. Running
/// it on an already consistent file changes nothing.
pub fn recover(file: &mut File) -> Result<RecoveryReport> {
    let mut header = format::read_header(file)?;
    header.validate_page_size()?;
    let page_size = header.page_size();

    let file_len = file.metadata()?.len();
    let pages_on_disk = (file_len / page_size as u64) as u32;
    let mut page = vec![0u8; page_size];

    let mut last_valid = 0u32;
    let mut row_count = 0u64;
    for page_no in 1..pages_on_disk {
        format::read_page(file, page_no, &mut page)?;
        if leaf_validate(&page, page_no).is_err() || leaf_row_count(&page) == 0 {
            tracing::warn!(page = page_no, "Dropping invalid trailing page during recovery");
            break;
        }
        last_valid = page_no;
        row_count += leaf_row_count(&page) as u64;
    }

    let keep_len = (last_valid as u64 + 1) * page_size as u64;
    let report = RecoveryReport {
        page_size,
        leaf_pages: last_valid,
        row_count,
        adopted_pages: last_valid.saturating_sub(header.last_leaf_page),
        truncated_bytes: file_len.saturating_sub(keep_len),
    };

    if keep_len < file_len {
        file.set_len(keep_len)?;
    }
    let repaired = FileHeader {
        last_leaf_page: last_valid,
        row_count,
        ..header
    };
    if repaired != header || report.truncated_bytes > 0 {
        header = repaired;
        format::write_header(file, &header)?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logdb::{LogReader, LogWriter, OwnedValue};
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom, Write};
    use std::path::Path;

    fn open_rw(path: &Path) -> File {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .unwrap()
    }

    fn row(ts: i64) -> [OwnedValue; 3] {
        [OwnedValue::Int64(ts), OwnedValue::Real(1.0), OwnedValue::Real(2.0)]
    }

    #[test]
    fn test_read_page_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.db");
        let mut writer = LogWriter::create(open_rw(&path), Vec::new(), 12, 3).unwrap();
        writer.finalize().unwrap();
        drop(writer);

        assert_eq!(read_page_size(&mut open_rw(&path)).unwrap(), 4096);

        std::fs::write(&path, b"garbage that is not a header at all....").unwrap();
        assert_eq!(read_page_size(&mut open_rw(&path)).unwrap(), 0);
    }

    #[test]
    fn test_recover_adopts_unfinalized_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.db");

        let mut writer = LogWriter::create(open_rw(&path), Vec::new(), 9, 3).unwrap();
        for ts in 0..30 {
            writer.append_row(&row(ts)).unwrap();
        }
        // crash: no finalize
        drop(writer);

        let mut file = open_rw(&path);
        let report = recover(&mut file).unwrap();
        assert_eq!(report.row_count, 30);
        assert_eq!(report.adopted_pages, report.leaf_pages);

        let reader = LogReader::open(file, Vec::new()).unwrap();
        assert_eq!(reader.header().row_count, 30);
    }

    #[test]
    fn test_recover_truncates_torn_tail_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.db");

        let mut writer = LogWriter::create(open_rw(&path), Vec::new(), 9, 3).unwrap();
        for ts in 0..12 {
            writer.append_row(&row(ts)).unwrap();
        }
        writer.finalize().unwrap();
        drop(writer);

        // half-written third page
        let mut file = open_rw(&path);
        file.seek(SeekFrom::End(0)).unwrap();
        file.write_all(&[0x0D; 700]).unwrap();

        let first = recover(&mut file).unwrap();
        assert_eq!(first.leaf_pages, 1);
        assert_eq!(first.row_count, 12);
        assert_eq!(first.truncated_bytes, 700);
        assert_eq!(file.metadata().unwrap().len(), 2 * 512);

        let second = recover(&mut file).unwrap();
        assert_eq!(second.leaf_pages, 1);
        assert_eq!(second.truncated_bytes, 0);
        assert_eq!(second.adopted_pages, 0);
    }

    #[test]
    fn test_torn_append_keeps_committed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.db");

        let mut writer = LogWriter::create(open_rw(&path), Vec::new(), 9, 3).unwrap();
        for ts in 0..5 {
            writer.append_row(&row(ts)).unwrap();
        }
        writer.finalize().unwrap();
        drop(writer);

        let mut writer = LogWriter::open_append(open_rw(&path), Vec::new()).unwrap();
        writer.append_row(&row(5)).unwrap();
        drop(writer);

        // the page write for row 5 only partly reached the disk
        let mut file = open_rw(&path);
        file.seek(SeekFrom::Start(2 * 512 + 20)).unwrap();
        file.write_all(&[0xEE; 80]).unwrap();

        let report = recover(&mut file).unwrap();
        assert_eq!(report.leaf_pages, 1);
        assert_eq!(report.row_count, 5);

        let mut reader = LogReader::open(file, Vec::new()).unwrap();
        let mut seen = Vec::new();
        while !reader.is_exhausted() {
            seen.push(reader.timestamp().unwrap());
            reader.advance().unwrap();
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_recover_rejects_bad_page_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.db");
        let header = FileHeader::new(8, 3);
        std::fs::write(&path, header.encode()).unwrap();

        let err = recover(&mut open_rw(&path)).unwrap_err();
        assert!(matches!(err, DbError::InvalidPageSize(256)));
    }
}

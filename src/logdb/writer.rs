use super::format::{
    self, leaf_init, leaf_row_count, leaf_seal, leaf_set_counts, leaf_used, leaf_validate,
    FileHeader, LEAF_HEADER_SIZE, ROW_PREFIX_SIZE, ROW_TAG_SIZE,
};
use super::value::OwnedValue;
use super::{DbError, Result};
use std::fs::File;

/// Write context for one flush run
///
/// Owns the open file and the page buffer for its lifetime; hand the buffer
/// back with [`LogWriter::into_buffer`] once done.
pub struct LogWriter {
    file: File,
    page: Vec<u8>,
    header: FileHeader,
    page_no: u32,
    appended: u64,
    row: Vec<u8>,
}

impl LogWriter {
    /// Initialize a brand new log in an empty (or truncated) file.
    pub fn create(mut file: File, mut page: Vec<u8>, page_size_exp: u8, col_count: u8) -> Result<Self> {
        let header = FileHeader::new(page_size_exp, col_count);
        header.validate_page_size()?;

        file.set_len(0)?;
        page.clear();
        page.resize(header.page_size(), 0);
        page[..format::HEADER_SIZE].copy_from_slice(&header.encode());
        format::write_page(&mut file, 0, &page)?;

        leaf_init(&mut page);
        Ok(Self {
            file,
            page,
            header,
            page_no: 1,
            appended: 0,
            row: Vec::with_capacity(64),
        })
    }

    /// Continue an existing log after its last committed row.
    ///
    /// Pages past the committed end are discarded; run [`super::recover`]
    /// first if they should be adopted instead. New rows always start on a
    /// fresh page, so committed pages are never written again.
    pub fn open_append(mut file: File, mut page: Vec<u8>) -> Result<Self> {
        let header = format::read_header(&mut file)?;
        header.validate_page_size()?;
        page.clear();
        page.resize(header.page_size(), 0);

        let committed_len = (header.last_leaf_page as u64 + 1) * header.page_size() as u64;
        if file.metadata()?.len() < committed_len {
            return Err(DbError::Truncated {
                found: header.last_leaf_page,
                available: (file.metadata()?.len() / header.page_size() as u64).saturating_sub(1) as u32,
            });
        }
        file.set_len(committed_len)?;

        if header.last_leaf_page > 0 {
            format::read_page(&mut file, header.last_leaf_page, &mut page)?;
            leaf_validate(&page, header.last_leaf_page)?;
        }
        leaf_init(&mut page);

        Ok(Self {
            file,
            page,
            header,
            page_no: header.last_leaf_page + 1,
            appended: 0,
            row: Vec::with_capacity(64),
        })
    }

    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Append one row; the page holding it is written and synced before returning.
    pub fn append_row(&mut self, values: &[OwnedValue]) -> Result<()> {
        if values.len() != self.header.col_count as usize {
            return Err(DbError::ColumnCountMismatch {
                expected: self.header.col_count,
                got: values.len(),
            });
        }

        self.row.clear();
        self.row.extend_from_slice(&[0, 0, values.len() as u8]);
        for value in values {
            self.row.extend_from_slice(&value.tag().to_be_bytes());
        }
        for value in values {
            value.write_be(&mut self.row);
        }
        let row_len = self.row.len();
        let max = self.page.len() - LEAF_HEADER_SIZE;
        if row_len > max {
            return Err(DbError::RowTooLarge { len: row_len, max });
        }
        self.row[..2].copy_from_slice(&(row_len as u16).to_be_bytes());
        debug_assert!(ROW_PREFIX_SIZE + values.len() * ROW_TAG_SIZE <= row_len);

        let mut used = leaf_used(&self.page);
        let mut rows = leaf_row_count(&self.page);
        if used + row_len > self.page.len() {
            self.page_no += 1;
            leaf_init(&mut self.page);
            used = LEAF_HEADER_SIZE;
            rows = 0;
        }

        self.page[used..used + row_len].copy_from_slice(&self.row);
        leaf_set_counts(&mut self.page, rows + 1, used + row_len);
        leaf_seal(&mut self.page);
        format::write_page(&mut self.file, self.page_no, &self.page)?;

        self.appended += 1;
        Ok(())
    }

    /// Publish everything appended so far by rewriting the header.
    ///
    /// Later appends move on to a new page so the published ones stay untouched.
    pub fn finalize(&mut self) -> Result<()> {
        let sealed = leaf_row_count(&self.page) > 0;
        if sealed {
            self.header.last_leaf_page = self.header.last_leaf_page.max(self.page_no);
        }
        self.header.row_count += self.appended;
        self.appended = 0;
        format::write_header(&mut self.file, &self.header)?;

        if sealed {
            self.page_no += 1;
            leaf_init(&mut self.page);
        }
        Ok(())
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Close the file and return the page buffer.
    pub fn into_buffer(self) -> Vec<u8> {
        self.page
    }
}

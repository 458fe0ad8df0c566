use super::format::{
    self, leaf_row_count, leaf_used, leaf_validate, read_u16, read_u32, FileHeader,
    LEAF_HEADER_SIZE, ROW_PREFIX_SIZE, ROW_TAG_SIZE,
};
use super::value::{value_len, ColumnValue};
use super::{DbError, Result};
use std::fs::File;

/// Read context: a forward-only cursor over committed rows
pub struct LogReader {
    file: File,
    page: Vec<u8>,
    header: FileHeader,
    page_no: u32,
    row_idx: u16,
    row_off: usize,
    exhausted: bool,
}

impl LogReader {
    /// Open a log for reading, positioned at its first row.
    pub fn open(mut file: File, mut page: Vec<u8>) -> Result<Self> {
        let header = format::read_header(&mut file)?;
        header.validate_page_size()?;
        page.clear();
        page.resize(header.page_size(), 0);

        let available = (file.metadata()?.len() / header.page_size() as u64).saturating_sub(1);
        if available < header.last_leaf_page as u64 {
            return Err(DbError::Truncated {
                found: header.last_leaf_page,
                available: available as u32,
            });
        }

        let mut reader = Self {
            file,
            page,
            header,
            page_no: 0,
            row_idx: 0,
            row_off: LEAF_HEADER_SIZE,
            exhausted: header.last_leaf_page == 0,
        };
        if !reader.exhausted {
            reader.load_page(1)?;
        }
        Ok(reader)
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn page_size(&self) -> usize {
        self.page.len()
    }

    /// `(page, row within page)` of the current row
    #[cfg(test)]
    pub fn position(&self) -> (u32, u16) {
        (self.page_no, self.row_idx)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn load_page(&mut self, page_no: u32) -> Result<()> {
        format::read_page(&mut self.file, page_no, &mut self.page)?;
        leaf_validate(&self.page, page_no)?;
        if leaf_row_count(&self.page) == 0 {
            return Err(DbError::CorruptPage { page: page_no, reason: "committed leaf page has no rows" });
        }
        self.page_no = page_no;
        self.row_idx = 0;
        self.row_off = LEAF_HEADER_SIZE;
        Ok(())
    }

    fn first_timestamp_of(&mut self, page_no: u32) -> Result<i64> {
        self.load_page(page_no)?;
        self.timestamp()
    }

    /// Position the cursor on the first row whose key column is `>= target`.
    ///
    /// Binary search over the first key of every leaf page, then a scan inside
    /// the chosen page. Returns false (and exhausts the cursor) when every row
    /// is smaller than `target`.
    pub fn seek_at_or_after(&mut self, target: i64) -> Result<bool> {
        if self.header.last_leaf_page == 0 {
            self.exhausted = true;
            return Ok(false);
        }

        let (mut lo, mut hi) = (1u32, self.header.last_leaf_page);
        let mut candidate = 1u32;
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            if self.first_timestamp_of(mid)? < target {
                candidate = mid;
                lo = mid + 1;
            } else {
                hi = mid - 1;
            }
        }

        self.exhausted = false;
        self.load_page(candidate)?;
        loop {
            if self.timestamp()? >= target {
                return Ok(true);
            }
            if !self.advance()? {
                return Ok(false);
            }
        }
    }

    /// Move to the next row. Returns false once past the last committed row.
    pub fn advance(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }
        let row_len = self.current_row()?.len;
        self.row_idx += 1;
        self.row_off += row_len;
        if self.row_idx < leaf_row_count(&self.page) {
            return Ok(true);
        }
        if self.page_no < self.header.last_leaf_page {
            self.load_page(self.page_no + 1)?;
            return Ok(true);
        }
        self.exhausted = true;
        Ok(false)
    }

    /// Borrow the row under the cursor.
    pub fn current_row(&self) -> Result<RowRef<'_>> {
        if self.exhausted {
            return Err(DbError::CorruptPage { page: self.page_no, reason: "read past the last row" });
        }
        let corrupt = |reason| DbError::CorruptPage { page: self.page_no, reason };
        let used = leaf_used(&self.page);
        if self.row_off + ROW_PREFIX_SIZE > used {
            return Err(corrupt("row header past used space"));
        }
        let len = read_u16(&self.page[self.row_off..]) as usize;
        let col_count = self.page[self.row_off + 2] as usize;
        let values_off = ROW_PREFIX_SIZE + col_count * ROW_TAG_SIZE;
        if len < values_off || self.row_off + len > used {
            return Err(corrupt("row length out of range"));
        }
        Ok(RowRef {
            bytes: &self.page[self.row_off..self.row_off + len],
            col_count,
            len,
        })
    }

    /// Key column (column 0) of the current row
    pub fn timestamp(&self) -> Result<i64> {
        let row = self.current_row()?;
        match row.columns().next() {
            Some(Ok((_, value))) => value.as_i64().ok_or(DbError::CorruptPage {
                page: self.page_no,
                reason: "key column is not an integer",
            }),
            Some(Err(e)) => Err(e),
            None => Err(DbError::CorruptPage { page: self.page_no, reason: "row has no columns" }),
        }
    }

    /// Close the file and return the page buffer.
    pub fn into_buffer(self) -> Vec<u8> {
        self.page
    }
}

/// One row borrowed from the page buffer
pub struct RowRef<'a> {
    bytes: &'a [u8],
    col_count: usize,
    len: usize,
}

impl<'a> RowRef<'a> {
    /// Iterate `(tag, value)` pairs in column order.
    pub fn columns(&self) -> Columns<'a> {
        Columns {
            bytes: self.bytes,
            col_count: self.col_count,
            idx: 0,
            value_off: ROW_PREFIX_SIZE + self.col_count * ROW_TAG_SIZE,
        }
    }
}

pub struct Columns<'a> {
    bytes: &'a [u8],
    col_count: usize,
    idx: usize,
    value_off: usize,
}

impl<'a> Iterator for Columns<'a> {
    type Item = Result<(u32, ColumnValue<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.col_count {
            return None;
        }
        let tag = read_u32(&self.bytes[ROW_PREFIX_SIZE + self.idx * ROW_TAG_SIZE..]);
        self.idx += 1;

        let len = match value_len(tag) {
            Ok(len) => len,
            Err(e) => {
                self.idx = self.col_count;
                return Some(Err(e));
            }
        };
        if self.value_off + len > self.bytes.len() {
            self.idx = self.col_count;
            return Some(Err(DbError::CorruptPage { page: 0, reason: "column value past row end" }));
        }
        let value = &self.bytes[self.value_off..self.value_off + len];
        self.value_off += len;
        Some(ColumnValue::decode(tag, value).map(|v| (tag, v)))
    }
}

use super::{DbError, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

pub const MAGIC: &[u8; 8] = b"PWRLOG01";

pub const MIN_PAGE_SIZE_EXP: u8 = 9;
pub const MAX_PAGE_SIZE_EXP: u8 = 15;
pub const MIN_PAGE_SIZE: u32 = 1 << MIN_PAGE_SIZE_EXP;

// Header: [magic 8][page_size_exp u8][col_count u8][reserved 2][last_leaf u32][row_count u64][reserved 4][crc32 u32]
pub const HEADER_SIZE: usize = 32;
const HDR_OFF_PAGE_EXP: usize = 8;
const HDR_OFF_COL_COUNT: usize = 9;
const HDR_OFF_LAST_LEAF: usize = 12;
const HDR_OFF_ROW_COUNT: usize = 16;
const HDR_OFF_CRC: usize = 28;

// Leaf page: [type u8][reserved u8][row_count u16][used u16][reserved 2][crc32 u32] then rows
pub const LEAF_PAGE_TYPE: u8 = 0x0D;
pub const LEAF_HEADER_SIZE: usize = 12;
const LEAF_OFF_ROW_COUNT: usize = 2;
const LEAF_OFF_USED: usize = 4;
const LEAF_OFF_CRC: usize = 8;

// Row: [len u16][col_count u8][tag u32 * col_count][values]
pub const ROW_PREFIX_SIZE: usize = 3;
pub const ROW_TAG_SIZE: usize = 4;

/// Decoded file header (page 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub page_size_exp: u8,
    pub col_count: u8,
    /// Highest leaf page that readers may look at; 0 when no rows are committed
    pub last_leaf_page: u32,
    pub row_count: u64,
}

impl FileHeader {
    pub fn new(page_size_exp: u8, col_count: u8) -> Self {
        Self {
            page_size_exp,
            col_count,
            last_leaf_page: 0,
            row_count: 0,
        }
    }

    pub fn page_size(&self) -> usize {
        1usize << self.page_size_exp
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..8].copy_from_slice(MAGIC);
        out[HDR_OFF_PAGE_EXP] = self.page_size_exp;
        out[HDR_OFF_COL_COUNT] = self.col_count;
        out[HDR_OFF_LAST_LEAF..HDR_OFF_LAST_LEAF + 4].copy_from_slice(&self.last_leaf_page.to_be_bytes());
        out[HDR_OFF_ROW_COUNT..HDR_OFF_ROW_COUNT + 8].copy_from_slice(&self.row_count.to_be_bytes());
        let crc = crc32fast::hash(&out[..HDR_OFF_CRC]);
        out[HDR_OFF_CRC..].copy_from_slice(&crc.to_be_bytes());
        out
    }

    /// Decode a header, validating magic and checksum but not the page size.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE || &bytes[..8] != MAGIC {
            return Err(DbError::BadHeader);
        }
        let stored_crc = read_u32(&bytes[HDR_OFF_CRC..]);
        if crc32fast::hash(&bytes[..HDR_OFF_CRC]) != stored_crc {
            return Err(DbError::BadHeader);
        }
        Ok(Self {
            page_size_exp: bytes[HDR_OFF_PAGE_EXP],
            col_count: bytes[HDR_OFF_COL_COUNT],
            last_leaf_page: read_u32(&bytes[HDR_OFF_LAST_LEAF..]),
            row_count: u64::from_be_bytes(bytes[HDR_OFF_ROW_COUNT..HDR_OFF_ROW_COUNT + 8].try_into().unwrap_or([0; 8])),
        })
    }

    pub fn validate_page_size(&self) -> Result<()> {
        if (MIN_PAGE_SIZE_EXP..=MAX_PAGE_SIZE_EXP).contains(&self.page_size_exp) {
            Ok(())
        } else {
            Err(DbError::InvalidPageSize(1u32.checked_shl(self.page_size_exp as u32).unwrap_or(0)))
        }
    }
}

pub fn read_header(file: &mut File) -> Result<FileHeader> {
    let mut bytes = [0u8; HEADER_SIZE];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut bytes).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => DbError::BadHeader,
        _ => DbError::Io(e),
    })?;
    FileHeader::decode(&bytes)
}

/// Write the header into page 0 and sync the whole file.
pub fn write_header(file: &mut File, header: &FileHeader) -> Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header.encode())?;
    file.sync_all()?;
    Ok(())
}

pub fn read_page(file: &mut File, page_no: u32, buf: &mut [u8]) -> Result<()> {
    file.seek(SeekFrom::Start(page_no as u64 * buf.len() as u64))?;
    file.read_exact(buf)?;
    Ok(())
}

pub fn write_page(file: &mut File, page_no: u32, buf: &[u8]) -> Result<()> {
    file.seek(SeekFrom::Start(page_no as u64 * buf.len() as u64))?;
    file.write_all(buf)?;
    file.flush()?;
    file.sync_data()?;
    Ok(())
}

pub fn leaf_init(buf: &mut [u8]) {
    buf.fill(0);
    buf[0] = LEAF_PAGE_TYPE;
    buf[LEAF_OFF_USED..LEAF_OFF_USED + 2].copy_from_slice(&(LEAF_HEADER_SIZE as u16).to_be_bytes());
}

pub fn leaf_row_count(buf: &[u8]) -> u16 {
    read_u16(&buf[LEAF_OFF_ROW_COUNT..])
}

pub fn leaf_used(buf: &[u8]) -> usize {
    read_u16(&buf[LEAF_OFF_USED..]) as usize
}

pub fn leaf_set_counts(buf: &mut [u8], rows: u16, used: usize) {
    buf[LEAF_OFF_ROW_COUNT..LEAF_OFF_ROW_COUNT + 2].copy_from_slice(&rows.to_be_bytes());
    buf[LEAF_OFF_USED..LEAF_OFF_USED + 2].copy_from_slice(&(used as u16).to_be_bytes());
}

fn leaf_crc(buf: &[u8], used: usize) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf[..LEAF_OFF_CRC]);
    hasher.update(&buf[LEAF_HEADER_SIZE..used]);
    hasher.finalize()
}

pub fn leaf_seal(buf: &mut [u8]) {
    let crc = leaf_crc(buf, leaf_used(buf));
    buf[LEAF_OFF_CRC..LEAF_OFF_CRC + 4].copy_from_slice(&crc.to_be_bytes());
}

pub fn leaf_validate(buf: &[u8], page_no: u32) -> Result<()> {
    if buf[0] != LEAF_PAGE_TYPE {
        return Err(DbError::CorruptPage { page: page_no, reason: "not a leaf page" });
    }
    let used = leaf_used(buf);
    if used < LEAF_HEADER_SIZE || used > buf.len() {
        return Err(DbError::CorruptPage { page: page_no, reason: "used size out of range" });
    }
    if leaf_crc(buf, used) != read_u32(&buf[LEAF_OFF_CRC..]) {
        return Err(DbError::CorruptPage { page: page_no, reason: "checksum mismatch" });
    }
    Ok(())
}

pub fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

pub fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip_and_crc() {
        let mut header = FileHeader::new(12, 3);
        header.last_leaf_page = 7;
        header.row_count = 1234;

        let bytes = header.encode();
        assert_eq!(FileHeader::decode(&bytes).unwrap(), header);

        let mut damaged = bytes;
        damaged[HDR_OFF_ROW_COUNT] ^= 0xFF;
        assert!(matches!(FileHeader::decode(&damaged), Err(DbError::BadHeader)));
    }

    #[test]
    fn test_page_size_validation() {
        assert!(FileHeader::new(9, 3).validate_page_size().is_ok());
        assert!(FileHeader::new(15, 3).validate_page_size().is_ok());
        assert!(matches!(
            FileHeader::new(8, 3).validate_page_size(),
            Err(DbError::InvalidPageSize(256))
        ));
        assert!(FileHeader::new(40, 3).validate_page_size().is_err());
    }

    #[test]
    fn test_leaf_seal_detects_damage() {
        let mut page = vec![0u8; 512];
        leaf_init(&mut page);
        page[LEAF_HEADER_SIZE] = 42;
        leaf_set_counts(&mut page, 1, LEAF_HEADER_SIZE + 1);
        leaf_seal(&mut page);
        assert!(leaf_validate(&page, 1).is_ok());

        page[LEAF_HEADER_SIZE] = 43;
        assert!(matches!(
            leaf_validate(&page, 1),
            Err(DbError::CorruptPage { page: 1, .. })
        ));
    }
}

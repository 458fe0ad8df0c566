use super::{DbError, Result};

/// Column type tags stored in front of every row
pub mod column_type {
    pub const NULL: u32 = 0;
    pub const INT8: u32 = 1;
    pub const INT16: u32 = 2;
    pub const INT32: u32 = 4;
    pub const INT64: u32 = 6;
    pub const REAL: u32 = 7;
    /// Tags from here on describe fixed-length data: even = blob, odd = text
    pub const FIXED_DATA_MIN: u32 = 12;
}

/// Length in bytes of a fixed-length data column with the given tag
pub fn derive_data_len(tag: u32) -> usize {
    (tag.saturating_sub(column_type::FIXED_DATA_MIN) / 2) as usize
}

/// Stored width of a column, or an error for tags the log does not understand
pub fn value_len(tag: u32) -> Result<usize> {
    match tag {
        column_type::NULL => Ok(0),
        column_type::INT8 => Ok(1),
        column_type::INT16 => Ok(2),
        column_type::INT32 => Ok(4),
        column_type::INT64 | column_type::REAL => Ok(8),
        t if t >= column_type::FIXED_DATA_MIN => Ok(derive_data_len(t)),
        t => Err(DbError::UnsupportedColumnType(t)),
    }
}

/// A column value borrowed from a page buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnValue<'a> {
    Null,
    Int(i64),
    Real(f64),
    Text(&'a [u8]),
    Blob(&'a [u8]),
}

impl<'a> ColumnValue<'a> {
    /// Decode a big-endian column value according to its tag.
    pub fn decode(tag: u32, bytes: &'a [u8]) -> Result<Self> {
        let expected = value_len(tag)?;
        if bytes.len() < expected {
            return Err(DbError::CorruptPage { page: 0, reason: "column value truncated" });
        }
        let value = match tag {
            column_type::NULL => Self::Null,
            column_type::INT8 => Self::Int(bytes[0] as i8 as i64),
            column_type::INT16 => Self::Int(i16::from_be_bytes([bytes[0], bytes[1]]) as i64),
            column_type::INT32 => {
                Self::Int(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64)
            }
            column_type::INT64 => Self::Int(i64::from_be_bytes(be8(bytes))),
            column_type::REAL => Self::Real(f64::from_bits(u64::from_be_bytes(be8(bytes)))),
            t if t % 2 == 1 => Self::Text(&bytes[..expected]),
            _ => Self::Blob(&bytes[..expected]),
        };
        Ok(value)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

fn be8(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[..8]);
    out
}

/// A column value to be appended
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedValue {
    Null,
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl OwnedValue {
    pub fn tag(&self) -> u32 {
        match self {
            Self::Null => column_type::NULL,
            Self::Int8(_) => column_type::INT8,
            Self::Int16(_) => column_type::INT16,
            Self::Int32(_) => column_type::INT32,
            Self::Int64(_) => column_type::INT64,
            Self::Real(_) => column_type::REAL,
            Self::Text(s) => column_type::FIXED_DATA_MIN + 1 + 2 * s.len() as u32,
            Self::Blob(b) => column_type::FIXED_DATA_MIN + 2 * b.len() as u32,
        }
    }

    pub fn write_be(&self, out: &mut Vec<u8>) {
        match self {
            Self::Null => {}
            Self::Int8(v) => out.extend_from_slice(&v.to_be_bytes()),
            Self::Int16(v) => out.extend_from_slice(&v.to_be_bytes()),
            Self::Int32(v) => out.extend_from_slice(&v.to_be_bytes()),
            Self::Int64(v) => out.extend_from_slice(&v.to_be_bytes()),
            Self::Real(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
            Self::Text(s) => out.extend_from_slice(s.as_bytes()),
            Self::Blob(b) => out.extend_from_slice(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_integers_big_endian() {
        assert_eq!(ColumnValue::decode(1, &[0xFF]).unwrap(), ColumnValue::Int(-1));
        assert_eq!(ColumnValue::decode(2, &[0x01, 0x00]).unwrap(), ColumnValue::Int(256));
        assert_eq!(
            ColumnValue::decode(4, &[0xFF, 0xFF, 0xFF, 0xFE]).unwrap(),
            ColumnValue::Int(-2)
        );
        assert_eq!(
            ColumnValue::decode(6, &100i64.to_be_bytes()).unwrap(),
            ColumnValue::Int(100)
        );
    }

    #[test]
    fn test_decode_real_reinterprets_bits() {
        let bytes = 1.5f64.to_bits().to_be_bytes();
        assert_eq!(ColumnValue::decode(7, &bytes).unwrap(), ColumnValue::Real(1.5));
    }

    #[test]
    fn test_fixed_length_parity() {
        let text = OwnedValue::Text("abc".to_string());
        assert_eq!(text.tag(), 19);
        assert_eq!(derive_data_len(19), 3);
        assert_eq!(ColumnValue::decode(19, b"abc").unwrap(), ColumnValue::Text(b"abc"));

        let blob = OwnedValue::Blob(vec![0x0A, 0xFF]);
        assert_eq!(blob.tag(), 16);
        assert_eq!(
            ColumnValue::decode(16, &[0x0A, 0xFF]).unwrap(),
            ColumnValue::Blob(&[0x0A, 0xFF])
        );
    }

    #[test]
    fn test_unsupported_tags_below_fixed_data() {
        for tag in [3u32, 5, 8, 9, 10, 11] {
            assert!(matches!(
                ColumnValue::decode(tag, &[0u8; 16]),
                Err(DbError::UnsupportedColumnType(t)) if t == tag
            ));
        }
    }
}

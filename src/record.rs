use crate::logdb::OwnedValue;
use serde::{Deserialize, Serialize};

/// Number of columns every persisted row carries
pub const COLUMN_COUNT: u8 = 3;

/// Upper bound for one row rendered as a JSON array plus its leading separator
///
/// `,[` + i64 (20) + `,` + two doubles (24 each) + `]`
pub const ROW_MAX_JSON_SIZE: usize = 2 + 20 + 1 + 24 + 1 + 24 + 1;

/// One sampled measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Seconds since the Unix epoch
    pub timestamp: i64,
    /// Current in milliamps
    pub measurement_a: f32,
    /// Voltage in millivolts
    pub measurement_b: f32,
}

impl Record {
    pub fn new(timestamp: i64, measurement_a: f32, measurement_b: f32) -> Self {
        Self {
            timestamp,
            measurement_a,
            measurement_b,
        }
    }

    /// Column values in on-disk order: int64 timestamp, then both measurements widened to doubles
    pub fn to_values(&self) -> [OwnedValue; COLUMN_COUNT as usize] {
        [
            OwnedValue::Int64(self.timestamp),
            OwnedValue::Real(self.measurement_a as f64),
            OwnedValue::Real(self.measurement_b as f64),
        ]
    }

    /// The row as a JSON array, the same shape the history endpoint emits
    pub fn to_json_row(&self) -> String {
        serde_json::to_string(&(self.timestamp, self.measurement_a, self.measurement_b))
            .unwrap_or_else(|_| "[]".to_string())
    }
}

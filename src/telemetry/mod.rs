//! Telemetry Record Streams
//!
//! Adapter between log decoders and the rest of FlightLens. A decoder is a
//! [`LogSource`]: it opens a file and hands back a [`RecordStream`] that yields
//! [`Record`]s one at a time and can be rewound to the start.
//!
//! Streams are opened per operation and dropped when the operation ends, so no
//! file handle outlives a request.
//!
//! ## Timestamps
//!
//! Every record carries the decoder's own timestamp (seconds). Consumers that
//! want wall-clock-ish time call [`Record::normalized_time`], which prefers the
//! `time_usec` and `time` fields and converts microsecond values to seconds.

pub mod dataflash;
pub mod demo;
mod error;
pub mod modes;
pub mod writer;

pub use dataflash::{DataflashSource, DataflashStream};
pub use error::{TelemetryError, TelemetryResult};
pub use writer::DataflashWriter;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Values above this are taken to be microseconds
const MICROSECOND_THRESHOLD: f64 = 1e12;

/// Message type carrying parameter values
pub const PARAM_MESSAGE: &str = "PARM";

/// Message type carrying flight mode changes
pub const MODE_MESSAGE: &str = "MODE";

/// A single decoded field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
    Array(Vec<i64>),
}

impl FieldValue {
    /// Integer or floating point
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldValue::Int(_) | FieldValue::Float(_))
    }

    /// Numeric value as f64, `None` for text and arrays
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            // Debug keeps the trailing ".0" on whole floats
            FieldValue::Float(v) => write!(f, "{:?}", v),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Array(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// One decoded telemetry message
#[derive(Debug, Clone)]
pub struct Record {
    msg_type: Arc<str>,
    columns: Arc<[String]>,
    values: Vec<FieldValue>,
    timestamp: Option<f64>,
}

impl Record {
    /// Build a record from a shared column list and matching values
    pub fn new(
        msg_type: Arc<str>,
        columns: Arc<[String]>,
        values: Vec<FieldValue>,
        timestamp: Option<f64>,
    ) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self {
            msg_type,
            columns,
            values,
            timestamp,
        }
    }

    /// Build a record from name/value pairs
    pub fn from_pairs(
        msg_type: &str,
        pairs: Vec<(&str, FieldValue)>,
        timestamp: Option<f64>,
    ) -> Self {
        let columns: Vec<String> = pairs.iter().map(|(name, _)| name.to_string()).collect();
        let values = pairs.into_iter().map(|(_, value)| value).collect();
        Self::new(msg_type.into(), columns.into(), values, timestamp)
    }

    pub fn msg_type(&self) -> &str {
        &self.msg_type
    }

    /// Decoder-native timestamp in seconds
    pub fn timestamp(&self) -> Option<f64> {
        self.timestamp
    }

    /// Look up a field by name
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Iterate over fields in decoder order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Owned name → value map, used for raw dumps
    pub fn to_map(&self) -> BTreeMap<String, FieldValue> {
        self.fields()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    /// Timestamp in seconds, preferring explicit time fields over the decoder clock.
    ///
    /// Tries `time_usec`, then `time`, skipping missing or zero values, then falls
    /// back to the decoder timestamp. Anything above 1e12 is treated as
    /// microseconds.
    pub fn normalized_time(&self) -> Option<f64> {
        let raw = ["time_usec", "time"]
            .iter()
            .filter_map(|name| self.get(name).and_then(FieldValue::as_f64))
            .find(|v| *v != 0.0)
            .or(self.timestamp)?;

        Some(normalize_timestamp(raw))
    }
}

/// Convert a microsecond timestamp to seconds; seconds pass through
pub fn normalize_timestamp(raw: f64) -> f64 {
    if raw > MICROSECOND_THRESHOLD {
        raw / 1e6
    } else {
        raw
    }
}

/// A contiguous interval spent in one flight mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightMode {
    pub mode: String,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
}

impl FlightMode {
    pub fn new(mode: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            mode: mode.into(),
            start,
            end,
            duration: end - start,
        }
    }
}

/// Sequential, restartable stream of records from one open file
pub trait RecordStream: Send {
    /// Next record, `None` at end of stream
    fn next_record(&mut self) -> TelemetryResult<Option<Record>>;

    /// Reposition at the first record
    fn rewind(&mut self) -> TelemetryResult<()>;
}

/// A log decoder
///
/// `open` may be called any number of times for the same path; each call returns
/// an independent stream.
pub trait LogSource: Send + Sync {
    fn open(&self, path: &Path) -> TelemetryResult<Box<dyn RecordStream>>;

    /// Flight mode intervals for the whole file
    fn flight_modes(&self, path: &Path) -> TelemetryResult<Vec<FlightMode>> {
        let mut stream = self.open(path)?;
        modes::segment(stream.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_time_prefers_time_usec() {
        let record = Record::from_pairs(
            "GLOBAL_POSITION_INT",
            vec![
                ("time_usec", FieldValue::Int(1_700_000_000_000_000)),
                ("time", FieldValue::Float(5.0)),
            ],
            Some(12.5),
        );
        assert_eq!(record.normalized_time(), Some(1_700_000_000.0));
    }

    #[test]
    fn test_normalized_time_skips_zero_fields() {
        let record = Record::from_pairs(
            "SYSTEM_TIME",
            vec![("time_usec", FieldValue::Int(0)), ("time", FieldValue::Float(42.0))],
            Some(12.5),
        );
        assert_eq!(record.normalized_time(), Some(42.0));
    }

    #[test]
    fn test_normalized_time_falls_back_to_decoder_clock() {
        let record = Record::from_pairs("ATT", vec![("Roll", FieldValue::Float(1.0))], Some(3.25));
        assert_eq!(record.normalized_time(), Some(3.25));

        let record = Record::from_pairs("ATT", vec![], None);
        assert_eq!(record.normalized_time(), None);
    }

    #[test]
    fn test_normalize_timestamp_threshold() {
        assert_eq!(normalize_timestamp(1e12), 1e12);
        assert_eq!(normalize_timestamp(2e12), 2e6);
        assert_eq!(normalize_timestamp(10.0), 10.0);
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Int(3).to_string(), "3");
        assert_eq!(FieldValue::Float(2.0).to_string(), "2.0");
        assert_eq!(FieldValue::Float(0.5).to_string(), "0.5");
        assert_eq!(FieldValue::Text("RATE_RLL_P".into()).to_string(), "RATE_RLL_P");
        assert_eq!(FieldValue::Array(vec![1, 2]).to_string(), "[1, 2]");
    }

    #[test]
    fn test_record_lookup() {
        let record = Record::from_pairs(
            "GPS",
            vec![("Lat", FieldValue::Float(47.1)), ("Status", FieldValue::Int(3))],
            None,
        );
        assert_eq!(record.msg_type(), "GPS");
        assert_eq!(record.get("Status"), Some(&FieldValue::Int(3)));
        assert!(record.get("Lng").is_none());
        assert_eq!(record.to_map().len(), 2);
    }
}

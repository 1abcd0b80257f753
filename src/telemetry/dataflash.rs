//! DataFlash log decoder
//!
//! ArduPilot `.bin` logs are a flat sequence of messages:
//!
//! ```text
//! ┌──────┬──────┬──────┬─────────────────────────┐
//! │ 0xA3 │ 0x95 │ type │ payload (fixed per type) │
//! └──────┴──────┴──────┴─────────────────────────┘
//! ```
//!
//! Type 128 (`FMT`) is self-describing and defines every other type: its name,
//! total length, a format string with one character per field, and the column
//! names. Bytes that do not start a known message are skipped one at a time
//! until the stream resynchronizes. A truncated final message ends the stream.

use super::error::{TelemetryError, TelemetryResult};
use super::{FieldValue, LogSource, Record, RecordStream};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub(crate) const HEAD1: u8 = 0xA3;
pub(crate) const HEAD2: u8 = 0x95;
pub(crate) const FMT_TYPE: u8 = 128;
pub(crate) const FMT_LENGTH: usize = 89;
pub(crate) const FMT_FORMAT: &str = "BBnNZ";
pub(crate) const FMT_COLUMNS: &str = "Type,Length,Name,Format,Columns";

/// Size in bytes of one encoded field
pub(crate) fn field_size(code: u8) -> Option<usize> {
    let size = match code {
        b'b' | b'B' | b'M' => 1,
        b'h' | b'H' | b'c' | b'C' => 2,
        b'i' | b'I' | b'f' | b'e' | b'E' | b'L' | b'n' => 4,
        b'd' | b'q' | b'Q' => 8,
        b'N' => 16,
        b'Z' | b'a' => 64,
        _ => return None,
    };
    Some(size)
}

/// Total payload size of a format string, `None` on an unknown code
pub(crate) fn payload_size(format: &str) -> Option<usize> {
    format.bytes().map(field_size).sum()
}

/// A message layout learned from an FMT record
#[derive(Debug, Clone)]
struct MessageFormat {
    name: Arc<str>,
    length: usize,
    format: Arc<[u8]>,
    columns: Arc<[String]>,
}

impl MessageFormat {
    fn fmt() -> Self {
        Self {
            name: "FMT".into(),
            length: FMT_LENGTH,
            format: FMT_FORMAT.as_bytes().into(),
            columns: split_columns(FMT_COLUMNS),
        }
    }

    /// Build a format from a decoded FMT record's values
    fn from_fmt_values(values: &[FieldValue]) -> TelemetryResult<(u8, Self)> {
        let (type_id, length, name, format, columns) = match values {
            [FieldValue::Int(t), FieldValue::Int(l), FieldValue::Text(n), FieldValue::Text(f), FieldValue::Text(c)] => {
                (*t, *l, n, f, c)
            }
            _ => return Err(TelemetryError::Malformed("bad FMT record".to_string())),
        };

        let type_id = u8::try_from(type_id)
            .map_err(|_| TelemetryError::Malformed(format!("FMT type {} out of range", type_id)))?;
        let length = length as usize;

        let needed = payload_size(format).ok_or_else(|| {
            TelemetryError::Malformed(format!("unknown format string {:?} for {}", format, name))
        })?;
        if length < 3 + needed {
            return Err(TelemetryError::Malformed(format!(
                "{} declares length {} but format {:?} needs {}",
                name,
                length,
                format,
                3 + needed
            )));
        }

        let columns = split_columns(columns);
        if columns.len() != format.len() {
            return Err(TelemetryError::Malformed(format!(
                "{} names {} columns for {} fields",
                name,
                columns.len(),
                format.len()
            )));
        }

        Ok((
            type_id,
            Self {
                name: name.as_str().into(),
                length,
                format: format.as_bytes().into(),
                columns,
            },
        ))
    }
}

fn split_columns(columns: &str) -> Arc<[String]> {
    columns
        .split(',')
        .filter(|c| !c.is_empty())
        .map(|c| c.trim().to_string())
        .collect::<Vec<_>>()
        .into()
}

/// Decode a message payload according to its format string
fn decode_payload(format: &[u8], body: &[u8]) -> TelemetryResult<Vec<FieldValue>> {
    let mut values = Vec::with_capacity(format.len());
    let mut pos = 0usize;

    for &code in format {
        let size = field_size(code).ok_or_else(|| {
            TelemetryError::Malformed(format!("unknown format character {:?}", code as char))
        })?;
        let raw = body.get(pos..pos + size).ok_or_else(|| {
            TelemetryError::Malformed("message payload shorter than its format".to_string())
        })?;
        pos += size;

        let value = match code {
            b'b' => FieldValue::Int(raw[0] as i8 as i64),
            b'B' | b'M' => FieldValue::Int(raw[0] as i64),
            b'h' => FieldValue::Int(i16::from_le_bytes([raw[0], raw[1]]) as i64),
            b'H' => FieldValue::Int(u16::from_le_bytes([raw[0], raw[1]]) as i64),
            b'i' => FieldValue::Int(i32::from_le_bytes(le4(raw)) as i64),
            b'I' => FieldValue::Int(u32::from_le_bytes(le4(raw)) as i64),
            b'f' => FieldValue::Float(f32::from_le_bytes(le4(raw)) as f64),
            b'd' => FieldValue::Float(f64::from_le_bytes(le8(raw))),
            b'q' => FieldValue::Int(i64::from_le_bytes(le8(raw))),
            b'Q' => {
                let v = u64::from_le_bytes(le8(raw));
                i64::try_from(v)
                    .map(FieldValue::Int)
                    .unwrap_or(FieldValue::Float(v as f64))
            }
            b'c' => FieldValue::Float(i16::from_le_bytes([raw[0], raw[1]]) as f64 / 100.0),
            b'C' => FieldValue::Float(u16::from_le_bytes([raw[0], raw[1]]) as f64 / 100.0),
            b'e' => FieldValue::Float(i32::from_le_bytes(le4(raw)) as f64 / 100.0),
            b'E' => FieldValue::Float(u32::from_le_bytes(le4(raw)) as f64 / 100.0),
            b'L' => FieldValue::Float(i32::from_le_bytes(le4(raw)) as f64 * 1e-7),
            b'n' | b'N' | b'Z' => FieldValue::Text(decode_text(raw)),
            b'a' => FieldValue::Array(
                raw.chunks_exact(2)
                    .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as i64)
                    .collect(),
            ),
            _ => unreachable!("field_size accepted an unknown code"),
        };
        values.push(value);
    }

    Ok(values)
}

fn le4(raw: &[u8]) -> [u8; 4] {
    [raw[0], raw[1], raw[2], raw[3]]
}

fn le8(raw: &[u8]) -> [u8; 8] {
    [raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7]]
}

/// Fixed-width strings are NUL padded
fn decode_text(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Derive the decoder timestamp (seconds) from a record's own time column
fn record_time(columns: &[String], values: &[FieldValue]) -> Option<f64> {
    let lookup = |name: &str| {
        columns
            .iter()
            .position(|c| c == name)
            .and_then(|idx| values.get(idx))
            .and_then(FieldValue::as_f64)
    };

    lookup("TimeUS")
        .map(|us| us / 1e6)
        .or_else(|| lookup("TimeMS").map(|ms| ms / 1e3))
}

/// Decoder for ArduPilot DataFlash `.bin` logs
#[derive(Debug, Clone, Copy, Default)]
pub struct DataflashSource;

impl LogSource for DataflashSource {
    fn open(&self, path: &Path) -> TelemetryResult<Box<dyn RecordStream>> {
        Ok(Box::new(DataflashStream::open(path)?))
    }
}

/// An open DataFlash file positioned at some message boundary
pub struct DataflashStream {
    path: PathBuf,
    reader: BufReader<File>,
    formats: HashMap<u8, MessageFormat>,
    last_timestamp: Option<f64>,
}

impl DataflashStream {
    /// Open a log and check that it starts with a message header
    pub fn open(path: &Path) -> TelemetryResult<Self> {
        let file = File::open(path).map_err(|source| TelemetryError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 2];
        if !read_full(&mut reader, &mut magic)? {
            return Err(TelemetryError::UnsupportedFormat(format!(
                "{} is empty or truncated",
                path.display()
            )));
        }
        if magic != [HEAD1, HEAD2] {
            return Err(TelemetryError::UnsupportedFormat(format!(
                "{} does not start with a DataFlash message header",
                path.display()
            )));
        }

        let mut stream = Self {
            path: path.to_path_buf(),
            reader,
            formats: HashMap::new(),
            last_timestamp: None,
        };
        stream.rewind()?;
        Ok(stream)
    }

    /// Step one byte past the start of a rejected header
    fn resync(&mut self) -> TelemetryResult<()> {
        self.reader.seek_relative(-2)?;
        Ok(())
    }
}

impl RecordStream for DataflashStream {
    fn next_record(&mut self) -> TelemetryResult<Option<Record>> {
        let mut header = [0u8; 3];

        loop {
            if !read_full(&mut self.reader, &mut header)? {
                return Ok(None);
            }

            if header[0] != HEAD1 || header[1] != HEAD2 {
                self.resync()?;
                continue;
            }

            let Some(format) = self.formats.get(&header[2]) else {
                self.resync()?;
                continue;
            };
            let format = format.clone();

            let mut body = vec![0u8; format.length - 3];
            if !read_full(&mut self.reader, &mut body)? {
                tracing::debug!(path = %self.path.display(), "truncated trailing message");
                return Ok(None);
            }

            let values = decode_payload(&format.format, &body)?;

            if header[2] == FMT_TYPE {
                let (type_id, learned) = MessageFormat::from_fmt_values(&values)?;
                self.formats.insert(type_id, learned);
            }

            if let Some(t) = record_time(&format.columns, &values) {
                self.last_timestamp = Some(t);
            }

            return Ok(Some(Record::new(
                format.name,
                format.columns,
                values,
                self.last_timestamp,
            )));
        }
    }

    fn rewind(&mut self) -> TelemetryResult<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.formats.clear();
        self.formats.insert(FMT_TYPE, MessageFormat::fmt());
        self.last_timestamp = None;
        Ok(())
    }
}

/// Fill `buf` completely; `false` if the file ends first
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::DataflashWriter;
    use tempfile::tempdir;

    fn write_log(path: &Path) {
        let mut writer = DataflashWriter::create(path).unwrap();
        writer
            .define("ATT", "QffZ", &["TimeUS", "Roll", "Pitch", "Note"])
            .unwrap();
        writer
            .define("GPS", "QLLcB", &["TimeUS", "Lat", "Lng", "Spd", "Status"])
            .unwrap();
        writer
            .write(
                "ATT",
                &[
                    FieldValue::Int(1_000_000),
                    FieldValue::Float(1.5),
                    FieldValue::Float(-0.25),
                    FieldValue::Text("level".into()),
                ],
            )
            .unwrap();
        writer
            .write(
                "GPS",
                &[
                    FieldValue::Int(2_500_000),
                    FieldValue::Float(47.3977419),
                    FieldValue::Float(8.5455938),
                    FieldValue::Float(12.34),
                    FieldValue::Int(3),
                ],
            )
            .unwrap();
        writer.finish().unwrap();
    }

    fn collect(stream: &mut dyn RecordStream) -> Vec<Record> {
        let mut records = Vec::new();
        while let Some(record) = stream.next_record().unwrap() {
            records.push(record);
        }
        records
    }

    #[test]
    fn test_decodes_fmt_and_data_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flight.bin");
        write_log(&path);

        let mut stream = DataflashStream::open(&path).unwrap();
        let records = collect(&mut stream);

        let types: Vec<&str> = records.iter().map(|r| r.msg_type()).collect();
        assert_eq!(types, vec!["FMT", "FMT", "ATT", "GPS"]);

        let att = &records[2];
        assert_eq!(att.get("Roll"), Some(&FieldValue::Float(1.5)));
        assert_eq!(att.get("Note"), Some(&FieldValue::Text("level".into())));
        assert_eq!(att.timestamp(), Some(1.0));

        let gps = &records[3];
        let lat = gps.get("Lat").and_then(FieldValue::as_f64).unwrap();
        assert!((lat - 47.3977419).abs() < 1e-6);
        let spd = gps.get("Spd").and_then(FieldValue::as_f64).unwrap();
        assert!((spd - 12.34).abs() < 1e-9);
        assert_eq!(gps.get("Status"), Some(&FieldValue::Int(3)));
        assert_eq!(gps.timestamp(), Some(2.5));
    }

    #[test]
    fn test_rewind_restarts_stream() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flight.bin");
        write_log(&path);

        let mut stream = DataflashStream::open(&path).unwrap();
        let first = collect(&mut stream).len();
        stream.rewind().unwrap();
        let second = collect(&mut stream).len();
        assert_eq!(first, second);
    }

    #[test]
    fn test_skips_garbage_between_messages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flight.bin");
        write_log(&path);

        let mut bytes = std::fs::read(&path).unwrap();
        // Garbage after the FMT records, before ATT
        let insert_at = 2 * FMT_LENGTH;
        bytes.splice(insert_at..insert_at, [0x00, 0xA3, 0x42, 0x13]);
        std::fs::write(&path, &bytes).unwrap();

        let mut stream = DataflashStream::open(&path).unwrap();
        let types: Vec<String> = collect(&mut stream)
            .iter()
            .map(|r| r.msg_type().to_string())
            .collect();
        assert_eq!(types, vec!["FMT", "FMT", "ATT", "GPS"]);
    }

    #[test]
    fn test_truncated_tail_ends_stream() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flight.bin");
        write_log(&path);

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        let mut stream = DataflashStream::open(&path).unwrap();
        let records = collect(&mut stream);
        assert_eq!(records.last().unwrap().msg_type(), "ATT");
    }

    #[test]
    fn test_rejects_non_dataflash_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello world").unwrap();

        let err = DataflashStream::open(&path).err().unwrap();
        assert!(matches!(err, TelemetryError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let dir = tempdir().unwrap();
        let err = DataflashSource
            .open(&dir.path().join("missing.bin"))
            .err()
            .unwrap();
        assert!(matches!(err, TelemetryError::Open { .. }));
    }

    /// Frame an FMT record by hand; the writer refuses mismatched definitions
    fn fmt_bytes(type_id: u8, length: u8, name: &str, format: &str, columns: &str) -> Vec<u8> {
        let mut bytes = vec![HEAD1, HEAD2, FMT_TYPE, type_id, length];
        for (text, width) in [(name, 4), (format, 16), (columns, 64)] {
            let mut field = text.as_bytes().to_vec();
            field.resize(width, 0);
            bytes.extend(field);
        }
        bytes
    }

    #[test]
    fn test_fmt_with_extra_columns_is_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.bin");

        let mut bytes = fmt_bytes(1, 3 + 8, "TST", "Q", "A,TimeUS");
        bytes.extend([HEAD1, HEAD2, 1]);
        bytes.extend(5_000_000u64.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let mut stream = DataflashStream::open(&path).unwrap();
        let err = stream.next_record().err().unwrap();
        assert!(matches!(err, TelemetryError::Malformed(_)));
    }

    #[test]
    fn test_payload_size() {
        assert_eq!(payload_size(FMT_FORMAT), Some(FMT_LENGTH - 3));
        assert_eq!(payload_size("QffZ"), Some(8 + 4 + 4 + 64));
        assert_eq!(payload_size("Qx"), None);
    }
}

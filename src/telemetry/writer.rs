//! DataFlash log writer
//!
//! Produces logs in the framing [`DataflashStream`](super::DataflashStream)
//! reads. Used to generate synthetic flights and test fixtures.

use super::dataflash::{field_size, payload_size, FMT_TYPE, HEAD1, HEAD2};
use super::FieldValue;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

struct Definition {
    type_id: u8,
    format: Vec<u8>,
}

/// Streaming encoder for DataFlash logs
pub struct DataflashWriter<W: Write> {
    out: W,
    definitions: HashMap<String, Definition>,
    next_type: u8,
}

impl DataflashWriter<BufWriter<File>> {
    /// Create (or truncate) a log file on disk
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> DataflashWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            definitions: HashMap::new(),
            next_type: 1,
        }
    }

    /// Define a message type by emitting its FMT record
    pub fn define(&mut self, name: &str, format: &str, columns: &[&str]) -> io::Result<u8> {
        if self.definitions.contains_key(name) {
            return Err(invalid(format!("message {} already defined", name)));
        }
        if format.len() != columns.len() {
            return Err(invalid(format!(
                "{}: {} format codes for {} columns",
                name,
                format.len(),
                columns.len()
            )));
        }
        let size = payload_size(format)
            .ok_or_else(|| invalid(format!("{}: unknown code in {:?}", name, format)))?;
        let length = u8::try_from(3 + size)
            .map_err(|_| invalid(format!("{}: message longer than 255 bytes", name)))?;

        if self.next_type == FMT_TYPE {
            self.next_type += 1;
        }
        let type_id = self.next_type;
        self.next_type = self
            .next_type
            .checked_add(1)
            .ok_or_else(|| invalid("too many message types".to_string()))?;

        let columns = columns.join(",");
        self.out.write_all(&[HEAD1, HEAD2, FMT_TYPE, type_id, length])?;
        write_text(&mut self.out, name, 4)?;
        write_text(&mut self.out, format, 16)?;
        write_text(&mut self.out, &columns, 64)?;

        self.definitions.insert(
            name.to_string(),
            Definition {
                type_id,
                format: format.as_bytes().to_vec(),
            },
        );
        Ok(type_id)
    }

    /// Append one message of a previously defined type
    pub fn write(&mut self, name: &str, values: &[FieldValue]) -> io::Result<()> {
        let definition = self
            .definitions
            .get(name)
            .ok_or_else(|| invalid(format!("message {} not defined", name)))?;

        if definition.format.len() != values.len() {
            return Err(invalid(format!(
                "{}: expected {} values, got {}",
                name,
                definition.format.len(),
                values.len()
            )));
        }

        let mut buf = vec![HEAD1, HEAD2, definition.type_id];
        for (&code, value) in definition.format.iter().zip(values) {
            encode_field(&mut buf, code, value)
                .ok_or_else(|| invalid(format!("{}: cannot encode {:?} as '{}'", name, value, code as char)))?;
        }
        self.out.write_all(&buf)
    }

    /// Flush and return the underlying writer
    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

fn write_text(out: &mut impl Write, text: &str, width: usize) -> io::Result<()> {
    let mut field = vec![0u8; width];
    let bytes = text.as_bytes();
    let len = bytes.len().min(width);
    field[..len].copy_from_slice(&bytes[..len]);
    out.write_all(&field)
}

fn encode_field(buf: &mut Vec<u8>, code: u8, value: &FieldValue) -> Option<()> {
    let int = || match value {
        FieldValue::Int(v) => Some(*v),
        FieldValue::Float(v) => Some(v.round() as i64),
        _ => None,
    };
    let scaled = |factor: f64| value.as_f64().map(|v| (v * factor).round() as i64);

    match code {
        b'b' => buf.push(int()? as i8 as u8),
        b'B' | b'M' => buf.push(int()? as u8),
        b'h' => buf.extend_from_slice(&(int()? as i16).to_le_bytes()),
        b'H' => buf.extend_from_slice(&(int()? as u16).to_le_bytes()),
        b'i' => buf.extend_from_slice(&(int()? as i32).to_le_bytes()),
        b'I' => buf.extend_from_slice(&(int()? as u32).to_le_bytes()),
        b'q' => buf.extend_from_slice(&int()?.to_le_bytes()),
        b'Q' => buf.extend_from_slice(&(int()? as u64).to_le_bytes()),
        b'f' => buf.extend_from_slice(&(value.as_f64()? as f32).to_le_bytes()),
        b'd' => buf.extend_from_slice(&value.as_f64()?.to_le_bytes()),
        b'c' => buf.extend_from_slice(&(scaled(100.0)? as i16).to_le_bytes()),
        b'C' => buf.extend_from_slice(&(scaled(100.0)? as u16).to_le_bytes()),
        b'e' => buf.extend_from_slice(&(scaled(100.0)? as i32).to_le_bytes()),
        b'E' => buf.extend_from_slice(&(scaled(100.0)? as u32).to_le_bytes()),
        b'L' => buf.extend_from_slice(&(scaled(1e7)? as i32).to_le_bytes()),
        b'n' | b'N' | b'Z' => {
            let text = value.as_text()?;
            let width = field_size(code)?;
            write_text(buf, text, width).ok()?;
        }
        b'a' => {
            let FieldValue::Array(items) = value else {
                return None;
            };
            for i in 0..32 {
                let v = items.get(i).copied().unwrap_or(0) as i16;
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        _ => return None,
    }
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_record_layout() {
        let mut writer = DataflashWriter::new(Vec::new());
        let type_id = writer.define("PARM", "QNf", &["TimeUS", "Name", "Value"]).unwrap();
        let bytes = writer.finish().unwrap();

        assert_eq!(bytes.len(), 89);
        assert_eq!(&bytes[..3], &[HEAD1, HEAD2, FMT_TYPE]);
        assert_eq!(bytes[3], type_id);
        assert_eq!(bytes[4] as usize, 3 + 8 + 16 + 4);
        assert_eq!(&bytes[5..9], b"PARM");
    }

    #[test]
    fn test_write_rejects_unknown_type_and_arity() {
        let mut writer = DataflashWriter::new(Vec::new());
        writer.define("BAT", "Qf", &["TimeUS", "Volt"]).unwrap();

        assert!(writer.write("CURR", &[FieldValue::Int(1)]).is_err());
        assert!(writer.write("BAT", &[FieldValue::Int(1)]).is_err());
        assert!(writer
            .write("BAT", &[FieldValue::Int(1), FieldValue::Text("x".into())])
            .is_err());
    }

    #[test]
    fn test_define_rejects_duplicates() {
        let mut writer = DataflashWriter::new(Vec::new());
        writer.define("BAT", "Qf", &["TimeUS", "Volt"]).unwrap();
        assert!(writer.define("BAT", "Qf", &["TimeUS", "Volt"]).is_err());
    }
}

//! Flight mode segmentation
//!
//! Walks a record stream, turns `MODE` records into contiguous intervals and
//! names the mode numbers according to the vehicle family announced in `MSG`
//! records (firmware banners such as "ArduPlane V4.5.1").

use super::error::TelemetryResult;
use super::{FieldValue, FlightMode, RecordStream, MODE_MESSAGE};

/// Vehicle family, decides how mode numbers are named
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VehicleFamily {
    #[default]
    Copter,
    Plane,
    Rover,
    Sub,
}

impl VehicleFamily {
    /// Detect the family from a firmware banner
    pub fn from_banner(text: &str) -> Option<Self> {
        if text.contains("ArduPlane") {
            Some(VehicleFamily::Plane)
        } else if text.contains("ArduRover") || text.contains("Rover") {
            Some(VehicleFamily::Rover)
        } else if text.contains("ArduSub") {
            Some(VehicleFamily::Sub)
        } else if text.contains("ArduCopter") || text.contains("Copter") {
            Some(VehicleFamily::Copter)
        } else {
            None
        }
    }

    /// Name for a numeric mode, `Mode(N)` when unknown
    pub fn mode_name(self, number: i64) -> String {
        let name = match self {
            VehicleFamily::Copter => copter_mode(number),
            VehicleFamily::Plane => plane_mode(number),
            VehicleFamily::Rover => rover_mode(number),
            VehicleFamily::Sub => sub_mode(number),
        };
        name.map(str::to_string)
            .unwrap_or_else(|| format!("Mode({})", number))
    }
}

fn copter_mode(number: i64) -> Option<&'static str> {
    Some(match number {
        0 => "STABILIZE",
        1 => "ACRO",
        2 => "ALT_HOLD",
        3 => "AUTO",
        4 => "GUIDED",
        5 => "LOITER",
        6 => "RTL",
        7 => "CIRCLE",
        9 => "LAND",
        11 => "DRIFT",
        13 => "SPORT",
        14 => "FLIP",
        15 => "AUTOTUNE",
        16 => "POSHOLD",
        17 => "BRAKE",
        18 => "THROW",
        19 => "AVOID_ADSB",
        20 => "GUIDED_NOGPS",
        21 => "SMART_RTL",
        22 => "FLOWHOLD",
        23 => "FOLLOW",
        24 => "ZIGZAG",
        25 => "SYSTEMID",
        26 => "AUTOROTATE",
        27 => "AUTO_RTL",
        _ => return None,
    })
}

fn plane_mode(number: i64) -> Option<&'static str> {
    Some(match number {
        0 => "MANUAL",
        1 => "CIRCLE",
        2 => "STABILIZE",
        3 => "TRAINING",
        4 => "ACRO",
        5 => "FBWA",
        6 => "FBWB",
        7 => "CRUISE",
        8 => "AUTOTUNE",
        10 => "AUTO",
        11 => "RTL",
        12 => "LOITER",
        13 => "TAKEOFF",
        14 => "AVOID_ADSB",
        15 => "GUIDED",
        17 => "QSTABILIZE",
        18 => "QHOVER",
        19 => "QLOITER",
        20 => "QLAND",
        21 => "QRTL",
        22 => "QAUTOTUNE",
        23 => "QACRO",
        24 => "THERMAL",
        _ => return None,
    })
}

fn rover_mode(number: i64) -> Option<&'static str> {
    Some(match number {
        0 => "MANUAL",
        1 => "ACRO",
        3 => "STEERING",
        4 => "HOLD",
        5 => "LOITER",
        6 => "FOLLOW",
        7 => "SIMPLE",
        10 => "AUTO",
        11 => "RTL",
        12 => "SMART_RTL",
        15 => "GUIDED",
        _ => return None,
    })
}

fn sub_mode(number: i64) -> Option<&'static str> {
    Some(match number {
        0 => "STABILIZE",
        1 => "ACRO",
        2 => "ALT_HOLD",
        3 => "AUTO",
        4 => "GUIDED",
        7 => "CIRCLE",
        9 => "SURFACE",
        16 => "POSHOLD",
        19 => "MANUAL",
        _ => return None,
    })
}

#[derive(Debug, Clone, PartialEq)]
enum ModeKey {
    Number(i64),
    Name(String),
}

fn mode_key(value: &FieldValue) -> Option<ModeKey> {
    match value {
        FieldValue::Int(n) => Some(ModeKey::Number(*n)),
        FieldValue::Float(f) => Some(ModeKey::Number(*f as i64)),
        FieldValue::Text(s) if !s.is_empty() => Some(ModeKey::Name(s.clone())),
        _ => None,
    }
}

/// Split a whole stream into flight mode intervals.
///
/// A `MODE` record whose mode differs from the current one closes the current
/// interval and opens a new one at its timestamp. The last interval ends at the
/// last timestamp seen anywhere in the log.
pub fn segment(stream: &mut dyn RecordStream) -> TelemetryResult<Vec<FlightMode>> {
    let mut family: Option<VehicleFamily> = None;
    let mut segments: Vec<(ModeKey, f64, f64)> = Vec::new();
    let mut last_timestamp: Option<f64> = None;

    while let Some(record) = stream.next_record()? {
        if let Some(t) = record.timestamp() {
            last_timestamp = Some(t);
        }

        match record.msg_type() {
            "MSG" if family.is_none() => {
                family = record
                    .get("Message")
                    .and_then(FieldValue::as_text)
                    .and_then(VehicleFamily::from_banner);
            }
            MODE_MESSAGE => {
                let Some(key) = record
                    .get("Mode")
                    .or_else(|| record.get("ModeNum"))
                    .and_then(mode_key)
                else {
                    continue;
                };
                let t = record.timestamp().or(last_timestamp).unwrap_or(0.0);

                if segments.last().map(|(k, _, _)| k) == Some(&key) {
                    continue;
                }
                if let Some(previous) = segments.last_mut() {
                    previous.2 = t;
                }
                segments.push((key, t, t));
            }
            _ => {}
        }
    }

    if let (Some(last), Some(end)) = (segments.last_mut(), last_timestamp) {
        last.2 = end;
    }

    let family = family.unwrap_or_default();
    Ok(segments
        .into_iter()
        .map(|(key, start, end)| {
            let name = match key {
                ModeKey::Number(n) => family.mode_name(n),
                ModeKey::Name(s) => s,
            };
            FlightMode::new(name, start, end)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{DataflashStream, DataflashWriter};
    use tempfile::tempdir;

    #[test]
    fn test_banner_detection() {
        assert_eq!(
            VehicleFamily::from_banner("ArduPlane V4.5.1 (abc)"),
            Some(VehicleFamily::Plane)
        );
        assert_eq!(
            VehicleFamily::from_banner("ArduCopter V4.4.0"),
            Some(VehicleFamily::Copter)
        );
        assert_eq!(VehicleFamily::from_banner("Frame: QUAD"), None);
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(VehicleFamily::Copter.mode_name(5), "LOITER");
        assert_eq!(VehicleFamily::Plane.mode_name(10), "AUTO");
        assert_eq!(VehicleFamily::Copter.mode_name(99), "Mode(99)");
    }

    #[test]
    fn test_segments_merge_repeats_and_end_at_last_timestamp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("modes.bin");

        let mut writer = DataflashWriter::create(&path).unwrap();
        writer.define("MSG", "QZ", &["TimeUS", "Message"]).unwrap();
        writer
            .define("MODE", "QMBB", &["TimeUS", "Mode", "ModeNum", "Rsn"])
            .unwrap();
        writer.define("BARO", "Qf", &["TimeUS", "Alt"]).unwrap();

        let mode = |t: i64, m: i64| {
            vec![
                FieldValue::Int(t),
                FieldValue::Int(m),
                FieldValue::Int(m),
                FieldValue::Int(0),
            ]
        };
        writer
            .write(
                "MSG",
                &[FieldValue::Int(0), FieldValue::Text("ArduPlane V4.5.1".into())],
            )
            .unwrap();
        writer.write("MODE", &mode(1_000_000, 0)).unwrap();
        writer.write("MODE", &mode(2_000_000, 0)).unwrap();
        writer.write("MODE", &mode(5_000_000, 10)).unwrap();
        writer
            .write("BARO", &[FieldValue::Int(9_000_000), FieldValue::Float(12.0)])
            .unwrap();
        writer.finish().unwrap();

        let mut stream = DataflashStream::open(&path).unwrap();
        let modes = segment(&mut stream).unwrap();

        assert_eq!(
            modes,
            vec![
                FlightMode::new("MANUAL", 1.0, 5.0),
                FlightMode::new("AUTO", 5.0, 9.0),
            ]
        );
        assert_eq!(modes[1].duration, 4.0);
    }

    #[test]
    fn test_no_mode_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("quiet.bin");

        let mut writer = DataflashWriter::create(&path).unwrap();
        writer.define("BARO", "Qf", &["TimeUS", "Alt"]).unwrap();
        writer
            .write("BARO", &[FieldValue::Int(1_000_000), FieldValue::Float(1.0)])
            .unwrap();
        writer.finish().unwrap();

        let mut stream = DataflashStream::open(&path).unwrap();
        assert!(segment(&mut stream).unwrap().is_empty());
    }
}

//! Synthetic flights
//!
//! Generates a plausible copter flight: takeoff in STABILIZE, a loiter, an
//! auto leg, return and landing. Attitude and baro are logged at 10 Hz, GPS at
//! 5 Hz, and a handful of parameters up front.

use super::{DataflashWriter, FieldValue};
use std::f64::consts::TAU;
use std::io::{self, Write};

const TICK_US: i64 = 100_000;
const HOME_LAT: f64 = 47.397742;
const HOME_LNG: f64 = 8.545594;
const CRUISE_ALT: f64 = 30.0;

/// Mode number and the fraction of the flight at which it is entered
const MODE_PLAN: [(i64, f64); 5] = [(0, 0.0), (5, 0.2), (3, 0.35), (6, 0.8), (9, 0.92)];

const PARAMS: [(&str, f64); 4] = [
    ("ARMING_CHECK", 1.0),
    ("WPNAV_SPEED", 500.0),
    ("RTL_ALT", 1500.0),
    ("BATT_CAPACITY", 5200.0),
];

fn altitude(progress: f64) -> f64 {
    if progress < 0.1 {
        CRUISE_ALT * progress / 0.1
    } else if progress > 0.92 {
        CRUISE_ALT * (1.0 - progress) / 0.08
    } else {
        CRUISE_ALT
    }
}

/// Write a `seconds`-long flight to `out`
pub fn write_demo_flight<W: Write>(out: W, seconds: u32) -> io::Result<W> {
    let mut writer = DataflashWriter::new(out);
    writer.define("MSG", "QZ", &["TimeUS", "Message"])?;
    writer.define("PARM", "QNf", &["TimeUS", "Name", "Value"])?;
    writer.define("MODE", "QMBB", &["TimeUS", "Mode", "ModeNum", "Rsn"])?;
    writer.define("ATT", "Qfff", &["TimeUS", "Roll", "Pitch", "Yaw"])?;
    writer.define("BARO", "Qff", &["TimeUS", "Alt", "Press"])?;
    writer.define("GPS", "QBLLf", &["TimeUS", "Status", "Lat", "Lng", "Alt"])?;

    writer.write(
        "MSG",
        &[
            FieldValue::Int(0),
            FieldValue::Text("ArduCopter V4.5.1 (synthetic)".into()),
        ],
    )?;
    for (name, value) in PARAMS {
        writer.write(
            "PARM",
            &[
                FieldValue::Int(0),
                FieldValue::Text(name.into()),
                FieldValue::Float(value),
            ],
        )?;
    }

    let ticks = i64::from(seconds.max(1)) * 10;
    let mut next_mode = 0;
    for tick in 0..ticks {
        let t = tick * TICK_US;
        let progress = tick as f64 / ticks as f64;

        while next_mode < MODE_PLAN.len() && progress >= MODE_PLAN[next_mode].1 {
            let number = MODE_PLAN[next_mode].0;
            writer.write(
                "MODE",
                &[
                    FieldValue::Int(t),
                    FieldValue::Int(number),
                    FieldValue::Int(number),
                    FieldValue::Int(1),
                ],
            )?;
            next_mode += 1;
        }

        let alt = altitude(progress);
        let phase = progress * TAU;
        writer.write(
            "ATT",
            &[
                FieldValue::Int(t),
                FieldValue::Float(3.0 * (phase * 7.0).sin()),
                FieldValue::Float(2.0 * (phase * 5.0).cos()),
                FieldValue::Float((progress * 360.0) % 360.0),
            ],
        )?;
        writer.write(
            "BARO",
            &[
                FieldValue::Int(t),
                FieldValue::Float(alt),
                FieldValue::Float(1013.25 - alt * 0.12),
            ],
        )?;
        if tick % 2 == 0 {
            writer.write(
                "GPS",
                &[
                    FieldValue::Int(t),
                    FieldValue::Int(3),
                    FieldValue::Float(HOME_LAT + 0.001 * phase.sin()),
                    FieldValue::Float(HOME_LNG + 0.001 * (1.0 - phase.cos())),
                    FieldValue::Float(488.0 + alt),
                ],
            )?;
        }
    }

    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build_index;
    use crate::telemetry::DataflashSource;
    use tempfile::tempdir;

    #[test]
    fn test_demo_flight_indexes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("demo.bin");
        let bytes = write_demo_flight(Vec::new(), 60).unwrap();
        std::fs::write(&path, bytes).unwrap();

        let index = build_index(&DataflashSource, &path).unwrap();
        assert_eq!(index.message("BARO").unwrap().count, 600);
        assert_eq!(index.message("GPS").unwrap().count, 300);
        assert_eq!(index.message("PARM").unwrap().count, 4);

        let modes: Vec<&str> = index.flight_modes.iter().map(|m| m.mode.as_str()).collect();
        assert_eq!(modes, ["STABILIZE", "LOITER", "AUTO", "RTL", "LAND"]);
        assert_eq!(index.flight_modes[1].start, 12.0);
    }

    #[test]
    fn test_altitude_profile() {
        assert_eq!(altitude(0.0), 0.0);
        assert_eq!(altitude(0.5), CRUISE_ALT);
        assert!(altitude(0.99) < 3.0);
    }
}

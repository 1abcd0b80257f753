//! Log Index
//!
//! One-pass summary of a log file, built once when an upload is analyzed and
//! immutable afterwards:
//!
//! - per message type: record count and the sorted names of fields that held a
//!   numeric value in at least one record
//! - flight mode intervals
//!
//! Building the index is the only full scan done purely for summarization. A
//! failure anywhere aborts the build; no partial index is ever returned.

use crate::telemetry::{FlightMode, LogSource, Record, TelemetryResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Instant;

/// Summary of one message type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub count: u64,
    pub fields: Vec<String>,
}

/// Immutable summary of a log file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogIndex {
    pub messages: BTreeMap<String, MessageInfo>,
    pub flight_modes: Vec<FlightMode>,
}

impl LogIndex {
    pub fn message(&self, msg_type: &str) -> Option<&MessageInfo> {
        self.messages.get(msg_type)
    }

    /// Total records across all types
    pub fn total_records(&self) -> u64 {
        self.messages.values().map(|m| m.count).sum()
    }

    /// Per-type record counts
    pub fn counts(&self) -> BTreeMap<String, u64> {
        self.messages
            .iter()
            .map(|(name, info)| (name.clone(), info.count))
            .collect()
    }
}

#[derive(Default)]
struct Accumulator {
    count: u64,
    fields: BTreeSet<String>,
}

impl Accumulator {
    fn add(&mut self, record: &Record) {
        self.count += 1;
        for (name, value) in record.fields() {
            if value.is_numeric() && !self.fields.contains(name) {
                self.fields.insert(name.to_string());
            }
        }
    }
}

/// Scan `path` once and build its index
pub fn build_index(source: &dyn LogSource, path: &Path) -> TelemetryResult<LogIndex> {
    let start = Instant::now();
    let mut stream = source.open(path)?;
    let mut acc: BTreeMap<String, Accumulator> = BTreeMap::new();

    while let Some(record) = stream.next_record()? {
        if let Some(entry) = acc.get_mut(record.msg_type()) {
            entry.add(&record);
        } else {
            let mut entry = Accumulator::default();
            entry.add(&record);
            acc.insert(record.msg_type().to_string(), entry);
        }
    }
    drop(stream);

    let flight_modes = source.flight_modes(path)?;

    let messages = acc
        .into_iter()
        .map(|(name, acc)| {
            (
                name,
                MessageInfo {
                    count: acc.count,
                    fields: acc.fields.into_iter().collect(),
                },
            )
        })
        .collect::<BTreeMap<_, _>>();

    tracing::debug!(
        path = %path.display(),
        message_types = messages.len(),
        flight_modes = flight_modes.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Log indexed"
    );

    Ok(LogIndex {
        messages,
        flight_modes,
    })
}

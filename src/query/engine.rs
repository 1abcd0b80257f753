use super::error::{QueryError, QueryResult};
use crate::session::AnalysisSession;
use crate::telemetry::{
    FieldValue, FlightMode, LogSource, Record, TelemetryResult, PARAM_MESSAGE,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

/// One time series sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub t: Option<f64>,
    pub v: FieldValue,
}

/// Whole-log statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogStats {
    pub total_messages: u64,
    pub message_types: usize,
    pub first_timestamp: Option<f64>,
    pub last_timestamp: Option<f64>,
    pub duration_seconds: f64,
    pub messages_per_type: BTreeMap<String, u64>,
}

/// A raw record with its decoder timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DumpEntry {
    pub timestamp: Option<f64>,
    pub data: BTreeMap<String, FieldValue>,
}

/// Read-only queries against analyzed logs.
///
/// Every method except [`flight_modes`](Self::flight_modes) re-opens and
/// re-scans the session's file; nothing is cached between calls. All of them
/// block, so async callers should run them on a blocking thread.
#[derive(Clone)]
pub struct QueryEngine {
    source: Arc<dyn LogSource>,
}

impl QueryEngine {
    pub fn new(source: Arc<dyn LogSource>) -> Self {
        Self { source }
    }

    /// Feed records to `visit` until it breaks or the file ends
    fn scan(
        &self,
        path: &Path,
        mut visit: impl FnMut(Record) -> ControlFlow<()>,
    ) -> TelemetryResult<()> {
        let mut stream = self.source.open(path)?;
        while let Some(record) = stream.next_record()? {
            if visit(record).is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Values of `field` in `msg` records, keeping every `decimate`-th record
    /// that carries the field.
    pub fn timeseries(
        &self,
        session: &AnalysisSession,
        msg: &str,
        field: &str,
        decimate: usize,
    ) -> QueryResult<Vec<SeriesPoint>> {
        if decimate == 0 {
            return Err(QueryError::Invalid(
                "decimate must be a positive integer".to_string(),
            ));
        }

        let mut series = Vec::new();
        let mut seen = 0usize;
        self.scan(session.path(), |record| {
            if record.msg_type() != msg {
                return ControlFlow::Continue(());
            }
            let Some(value) = record.get(field) else {
                return ControlFlow::Continue(());
            };
            if seen % decimate == 0 {
                series.push(SeriesPoint {
                    t: record.normalized_time(),
                    v: value.clone(),
                });
            }
            seen += 1;
            ControlFlow::Continue(())
        })
        .map_err(|source| QueryError::Scan {
            op: "extract timeseries",
            source,
        })?;

        tracing::debug!(
            token = %session.token,
            msg,
            field,
            decimate,
            matched = seen,
            points = series.len(),
            "Timeseries extracted"
        );
        Ok(series)
    }

    /// CSV of every `msg` record: `_time` then the indexed numeric fields
    pub fn export_csv(&self, session: &AnalysisSession, msg: &str) -> QueryResult<Vec<u8>> {
        let info = session
            .index
            .message(msg)
            .ok_or_else(|| QueryError::UnknownMessageType(msg.to_string()))?;
        if info.fields.is_empty() {
            return Err(QueryError::NoNumericFields);
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(std::iter::once("_time").chain(info.fields.iter().map(String::as_str)))
            .map_err(|e| QueryError::Csv(e.to_string()))?;

        let mut write_error = None;
        self.scan(session.path(), |record| {
            if record.msg_type() != msg {
                return ControlFlow::Continue(());
            }
            let time = record
                .normalized_time()
                .map(|t| FieldValue::Float(t).to_string())
                .unwrap_or_default();
            let row = std::iter::once(time).chain(
                info.fields
                    .iter()
                    .map(|f| record.get(f).map(ToString::to_string).unwrap_or_default()),
            );
            match writer.write_record(row) {
                Ok(()) => ControlFlow::Continue(()),
                Err(e) => {
                    write_error = Some(e);
                    ControlFlow::Break(())
                }
            }
        })
        .map_err(|e| QueryError::Csv(e.to_string()))?;

        if let Some(e) = write_error {
            return Err(QueryError::Csv(e.to_string()));
        }
        writer
            .into_inner()
            .map_err(|e| QueryError::Csv(e.to_string()))
    }

    /// Record counts and the decoder time span
    pub fn stats(&self, session: &AnalysisSession) -> QueryResult<LogStats> {
        let mut total_messages = 0u64;
        let mut first_timestamp = None;
        let mut last_timestamp = None;

        self.scan(session.path(), |record| {
            total_messages += 1;
            if let Some(t) = record.timestamp() {
                first_timestamp.get_or_insert(t);
                last_timestamp = Some(t);
            }
            ControlFlow::Continue(())
        })
        .map_err(|source| QueryError::Scan {
            op: "get stats",
            source,
        })?;

        let duration_seconds = match (first_timestamp, last_timestamp) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        };

        Ok(LogStats {
            total_messages,
            message_types: session.index.messages.len(),
            first_timestamp,
            last_timestamp,
            duration_seconds,
            messages_per_type: session.index.counts(),
        })
    }

    /// Up to `limit` raw records of `msg_type`. Reading stops at the limit.
    pub fn dump(
        &self,
        session: &AnalysisSession,
        msg_type: &str,
        limit: usize,
    ) -> QueryResult<Vec<DumpEntry>> {
        let mut entries = Vec::new();
        if limit == 0 {
            return Ok(entries);
        }

        self.scan(session.path(), |record| {
            if record.msg_type() == msg_type {
                entries.push(DumpEntry {
                    timestamp: record.timestamp(),
                    data: record.to_map(),
                });
                if entries.len() >= limit {
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        })
        .map_err(|source| QueryError::Scan {
            op: "dump messages",
            source,
        })?;

        Ok(entries)
    }

    /// Parameter table; a later value for the same name replaces an earlier one
    pub fn params(&self, session: &AnalysisSession) -> QueryResult<BTreeMap<String, FieldValue>> {
        let mut params = BTreeMap::new();

        self.scan(session.path(), |record| {
            if record.msg_type() == PARAM_MESSAGE {
                let name = record.get("Name").and_then(FieldValue::as_text);
                if let (Some(name), Some(value)) = (name, record.get("Value")) {
                    params.insert(name.to_string(), value.clone());
                }
            }
            ControlFlow::Continue(())
        })
        .map_err(|source| QueryError::Scan {
            op: "extract params",
            source,
        })?;

        Ok(params)
    }

    /// Flight modes recorded in the index
    pub fn flight_modes(&self, session: &AnalysisSession) -> Vec<FlightMode> {
        session.index.flight_modes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build_index;
    use crate::telemetry::{DataflashSource, DataflashWriter, RecordStream, TelemetryResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{tempdir, TempDir};

    /// Counts the records handed out by every stream it opens
    struct CountingSource {
        inner: DataflashSource,
        yielded: Arc<AtomicUsize>,
    }

    struct CountingStream {
        inner: Box<dyn RecordStream>,
        yielded: Arc<AtomicUsize>,
    }

    impl RecordStream for CountingStream {
        fn next_record(&mut self) -> TelemetryResult<Option<Record>> {
            let record = self.inner.next_record()?;
            if record.is_some() {
                self.yielded.fetch_add(1, Ordering::SeqCst);
            }
            Ok(record)
        }

        fn rewind(&mut self) -> TelemetryResult<()> {
            self.inner.rewind()
        }
    }

    impl LogSource for CountingSource {
        fn open(&self, path: &Path) -> TelemetryResult<Box<dyn RecordStream>> {
            Ok(Box::new(CountingStream {
                inner: self.inner.open(path)?,
                yielded: Arc::clone(&self.yielded),
            }))
        }
    }

    fn write_log(path: &Path) {
        let mut writer = DataflashWriter::create(path).unwrap();
        writer
            .define("BARO", "Qff", &["TimeUS", "Alt", "Press"])
            .unwrap();
        writer.define("PARM", "QNf", &["TimeUS", "Name", "Value"]).unwrap();
        writer
            .define("MODE", "QMBB", &["TimeUS", "Mode", "ModeNum", "Rsn"])
            .unwrap();

        writer
            .write(
                "MODE",
                &[
                    FieldValue::Int(0),
                    FieldValue::Int(0),
                    FieldValue::Int(0),
                    FieldValue::Int(1),
                ],
            )
            .unwrap();
        for i in 0..100i64 {
            writer
                .write(
                    "BARO",
                    &[
                        FieldValue::Int(1_000_000 + i * 100_000),
                        FieldValue::Float(i as f64),
                        FieldValue::Float(1013.0),
                    ],
                )
                .unwrap();
        }
        for (t, value) in [(2_000_000, 1.0), (3_000_000, 2.0)] {
            writer
                .write(
                    "PARM",
                    &[
                        FieldValue::Int(t),
                        FieldValue::Text("X".into()),
                        FieldValue::Float(value),
                    ],
                )
                .unwrap();
        }
        writer
            .write(
                "PARM",
                &[
                    FieldValue::Int(11_000_000),
                    FieldValue::Text("Y".into()),
                    FieldValue::Float(0.5),
                ],
            )
            .unwrap();
        writer.finish().unwrap();
    }

    fn session_for(dir: &TempDir) -> AnalysisSession {
        let path = dir.path().join("flight.bin");
        write_log(&path);
        let index = build_index(&DataflashSource, &path).unwrap();
        let size = std::fs::metadata(&path).unwrap().len();
        AnalysisSession::new(dir.path().to_path_buf(), path, index, size, None)
    }

    fn engine() -> QueryEngine {
        QueryEngine::new(Arc::new(DataflashSource))
    }

    #[test]
    fn test_timeseries_decimation() {
        let dir = tempdir().unwrap();
        let session = session_for(&dir);

        let all = engine().timeseries(&session, "BARO", "Alt", 1).unwrap();
        assert_eq!(all.len(), 100);
        assert_eq!(all[0].t, Some(1.0));
        assert_eq!(all[0].v, FieldValue::Float(0.0));

        let every_7th = engine().timeseries(&session, "BARO", "Alt", 7).unwrap();
        // ceil(100 / 7)
        assert_eq!(every_7th.len(), 15);
        for (i, point) in every_7th.iter().enumerate() {
            assert_eq!(point.v, FieldValue::Float((i * 7) as f64));
        }
    }

    #[test]
    fn test_timeseries_missing_field_and_zero_decimate() {
        let dir = tempdir().unwrap();
        let session = session_for(&dir);

        assert!(engine()
            .timeseries(&session, "BARO", "NoSuchField", 1)
            .unwrap()
            .is_empty());
        assert!(matches!(
            engine().timeseries(&session, "BARO", "Alt", 0),
            Err(QueryError::Invalid(_))
        ));
    }

    #[test]
    fn test_csv_export() {
        let dir = tempdir().unwrap();
        let session = session_for(&dir);

        let csv = String::from_utf8(engine().export_csv(&session, "PARM").unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "_time,TimeUS,Value");
        assert_eq!(lines[1], "2.0,2000000,1.0");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_csv_empty_cell_for_absent_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sparse.bin");
        let mut writer = DataflashWriter::create(&path).unwrap();
        writer.define("AB", "Qff", &["TimeUS", "A", "B"]).unwrap();
        writer
            .write(
                "AB",
                &[
                    FieldValue::Int(1_000_000),
                    FieldValue::Float(1.0),
                    FieldValue::Float(2.0),
                ],
            )
            .unwrap();
        writer.finish().unwrap();

        // The index lists a field no record carries
        let mut index = build_index(&DataflashSource, &path).unwrap();
        index.messages.get_mut("AB").unwrap().fields = vec!["A".into(), "B".into(), "C".into()];
        let session = AnalysisSession::new(dir.path().to_path_buf(), path, index, 0, None);

        let csv = String::from_utf8(engine().export_csv(&session, "AB").unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "_time,A,B,C");
        assert_eq!(lines[1], "1.0,1.0,2.0,");
    }

    #[test]
    fn test_csv_errors() {
        let dir = tempdir().unwrap();
        let mut session = session_for(&dir);

        assert!(matches!(
            engine().export_csv(&session, "XYZ"),
            Err(QueryError::UnknownMessageType(_))
        ));

        session.index.messages.get_mut("BARO").unwrap().fields.clear();
        assert!(matches!(
            engine().export_csv(&session, "BARO"),
            Err(QueryError::NoNumericFields)
        ));
    }

    #[test]
    fn test_stats() {
        let dir = tempdir().unwrap();
        let session = session_for(&dir);

        let stats = engine().stats(&session).unwrap();
        // 3 FMT + 1 MODE + 100 BARO + 3 PARM
        assert_eq!(stats.total_messages, 107);
        assert_eq!(stats.message_types, 4);
        assert_eq!(stats.first_timestamp, Some(0.0));
        assert_eq!(stats.last_timestamp, Some(11.0));
        assert_eq!(stats.duration_seconds, 11.0);
        assert_eq!(stats.messages_per_type["BARO"], 100);
    }

    #[test]
    fn test_dump_stops_at_limit() {
        let dir = tempdir().unwrap();
        let session = session_for(&dir);
        let yielded = Arc::new(AtomicUsize::new(0));
        let engine = QueryEngine::new(Arc::new(CountingSource {
            inner: DataflashSource,
            yielded: Arc::clone(&yielded),
        }));

        let entries = engine.dump(&session, "BARO", 5).unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].timestamp, Some(1.0));
        assert_eq!(entries[4].data["Alt"], FieldValue::Float(4.0));
        // 3 FMT + 1 MODE + 5 BARO, nothing after the fifth match
        assert_eq!(yielded.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn test_dump_limit_larger_than_matches() {
        let dir = tempdir().unwrap();
        let session = session_for(&dir);
        assert_eq!(engine().dump(&session, "PARM", 100).unwrap().len(), 3);
        assert!(engine().dump(&session, "PARM", 0).unwrap().is_empty());
    }

    #[test]
    fn test_params_last_write_wins() {
        let dir = tempdir().unwrap();
        let session = session_for(&dir);

        let params = engine().params(&session).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params["X"], FieldValue::Float(2.0));
        assert_eq!(params["Y"], FieldValue::Float(0.5));
    }

    #[test]
    fn test_flight_modes_come_from_index() {
        let dir = tempdir().unwrap();
        let session = session_for(&dir);
        let modes = engine().flight_modes(&session);
        assert_eq!(modes, vec![FlightMode::new("STABILIZE", 0.0, 11.0)]);
    }

    #[test]
    fn test_scan_failure_is_an_error() {
        let dir = tempdir().unwrap();
        let session = session_for(&dir);
        std::fs::remove_file(session.path()).unwrap();

        let err = engine().params(&session).unwrap_err();
        assert!(err.to_string().starts_with("failed to extract params: "));
        assert!(matches!(
            engine().export_csv(&session, "BARO"),
            Err(QueryError::Csv(_))
        ));
    }
}

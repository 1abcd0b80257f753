//! Benchmarks for log indexing and query scans
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use flightlens::index::build_index;
use flightlens::query::QueryEngine;
use flightlens::session::AnalysisSession;
use flightlens::telemetry::demo::write_demo_flight;
use flightlens::telemetry::DataflashSource;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

/// A synthetic flight on disk plus its session
fn demo_session(seconds: u32) -> (TempDir, AnalysisSession) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("demo.bin");
    let bytes = write_demo_flight(Vec::new(), seconds).unwrap();
    let size = bytes.len() as u64;
    std::fs::write(&path, bytes).unwrap();

    let index = build_index(&DataflashSource, &path).unwrap();
    let session = AnalysisSession::new(dir.path().to_path_buf(), path, index, size, None);
    (dir, session)
}

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");

    for seconds in [60, 600] {
        let (_dir, session) = demo_session(seconds);
        group.throughput(Throughput::Bytes(session.file_size));

        group.bench_function(format!("build_{}s", seconds), |b| {
            b.iter(|| build_index(&DataflashSource, black_box(session.path())).unwrap())
        });
    }

    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    let (_dir, session) = demo_session(600);
    let engine = QueryEngine::new(Arc::new(DataflashSource));

    group.bench_function("timeseries_full", |b| {
        b.iter(|| engine.timeseries(&session, "BARO", "Alt", 1).unwrap())
    });

    group.bench_function("timeseries_decimate_10", |b| {
        b.iter(|| engine.timeseries(&session, "BARO", "Alt", black_box(10)).unwrap())
    });

    // Stops reading after the limit
    group.bench_function("dump_100", |b| {
        b.iter(|| engine.dump(&session, "GPS", black_box(100)).unwrap())
    });

    group.bench_function("export_csv", |b| {
        b.iter(|| engine.export_csv(&session, "ATT").unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_index, bench_queries);
criterion_main!(benches);

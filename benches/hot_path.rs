//! Benchmarks for the calls pipeline workers make on every step.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use opsledger::audit::{references, AuditTrail};
use opsledger::config::TrackerConfig;
use opsledger::core::crypto::genesis_hash;
use opsledger::{PerformanceTracker, ProvenanceManager, References, Status};
use std::time::Duration;

fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker_record");
    for window_size in [100, 1000, 10_000] {
        let config = TrackerConfig {
            window_size,
            ..TrackerConfig::default()
        };
        let tracker = PerformanceTracker::in_memory(config).unwrap();
        let mut i = 0u64;
        group.bench_with_input(
            BenchmarkId::from_parameter(window_size),
            &tracker,
            |b, tracker| {
                b.iter(|| {
                    i = i.wrapping_add(1);
                    tracker.record(
                        black_box("extract_entities"),
                        Duration::from_micros(1000 + i % 500),
                        i % 50 != 0,
                    );
                });
            },
        );
    }
    group.finish();
}

fn bench_append(c: &mut Criterion) {
    let trail = AuditTrail::new("doc-bench", genesis_hash("bench"));
    let used = references([("text", "sha3:0123456789abcdef"), ("model", "ner-v3")]);
    let generated = references([("entities", "sha3:fedcba9876543210")]);

    c.bench_function("trail_append", |b| {
        b.iter(|| {
            let entry = trail.append(
                black_box("extract_entities"),
                used.clone(),
                generated.clone(),
                Status::Success,
            );
            black_box(entry);
        });
    });
}

fn bench_start_complete(c: &mut Criterion) {
    let manager = ProvenanceManager::default();

    c.bench_function("start_complete", |b| {
        b.iter(|| {
            let token = manager.start_operation("doc-bench", "chunk", References::new());
            let entry = manager
                .complete_operation(&token, References::new(), Status::Success)
                .unwrap();
            black_box(entry);
        });
    });
}

fn bench_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify_integrity");
    for len in [100, 1000] {
        let trail = AuditTrail::new("doc-verify", genesis_hash("bench"));
        for _ in 0..len {
            trail.append("chunk", References::new(), References::new(), Status::Success);
        }
        group.bench_with_input(BenchmarkId::from_parameter(len), &trail, |b, trail| {
            b.iter(|| black_box(trail.verify_integrity()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_record,
    bench_append,
    bench_start_complete,
    bench_verify
);
criterion_main!(benches);

//! Segment write benchmarks.
//!
//! Measures append throughput of a single segment on `tokio::fs` for a few
//! body sizes, with the default flush policies and with a sync per append.

#![allow(missing_docs)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Builder;
use tokio::time::Instant;

use strata_core::Offset;
use strata_log::{FlushPolicy, Segment, SegmentConfig, TokioStorage};

const RECORDS_PER_ITER: u64 = 1000;

async fn write_records(dir: &Path, config: &SegmentConfig, body: &[u8]) {
    let mut segment = Segment::open(Arc::new(TokioStorage::new()), dir, Offset::ZERO, config)
        .await
        .expect("failed to open segment");
    for id in 1..=RECORDS_PER_ITER {
        black_box(
            segment
                .write(Offset::new(id), body)
                .await
                .expect("write failed"),
        );
    }
}

fn bench_segment_append(c: &mut Criterion) {
    let rt = Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .build()
        .expect("failed to build runtime");

    let mut group = c.benchmark_group("segment_append");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));
    group.throughput(Throughput::Elements(RECORDS_PER_ITER));

    let policies = [
        ("default_flush", SegmentConfig::new()),
        (
            "sync_every_append",
            SegmentConfig::new()
                .with_index_flush(FlushPolicy::Always)
                .with_log_flush(FlushPolicy::Always),
        ),
    ];

    for body_size in [64usize, 1024] {
        for (name, config) in &policies {
            let config = config.with_capacity_bytes(u64::MAX);
            group.bench_with_input(
                BenchmarkId::new(*name, body_size),
                &body_size,
                |b, &size| {
                    let body = vec![0xA5u8; size];
                    b.iter_custom(|iters| {
                        rt.block_on(async {
                            let start = Instant::now();
                            for _ in 0..iters {
                                let dir = tempfile::tempdir().expect("failed to create temp dir");
                                write_records(dir.path(), &config, &body).await;
                            }
                            start.elapsed()
                        })
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_segment_append);
criterion_main!(benches);

//! Criterion benchmarks for the bridging queue.
//!
//! Measures the cost of feeding and draining message units through the
//! two-stack FIFO, with and without the consumption-sequence claim overhead.
//!
//! Run with:
//! ```bash
//! cargo bench --package wt-core --bench queue_bench
//! ```

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use uuid::Uuid;
use wt_core::{BridgingQueue, ConsumptionSequence, InboundMessageUnit, NextResult, SequenceResult};

fn make_units(n: usize) -> Vec<InboundMessageUnit> {
    let source = Uuid::new_v4();
    (0..n)
        .map(|i| InboundMessageUnit::binary(source, vec![i as u8; 64]))
        .collect()
}

fn bench_feed_then_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("feed_then_drain");
    for size in [16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || make_units(size),
                |units| {
                    let queue = BridgingQueue::new();
                    queue.feed(units);
                    while let NextResult::Ready(unit) = queue.next() {
                        black_box(unit);
                        queue.release();
                    }
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_sequence_drain(c: &mut Criterion) {
    c.bench_function("sequence_drain_256", |b| {
        b.iter_batched(
            || {
                let queue = Arc::new(BridgingQueue::new());
                queue.feed(make_units(256));
                queue
            },
            |queue| {
                let mut seq = ConsumptionSequence::new(queue);
                while let SequenceResult::Success(claim) = seq.step() {
                    black_box(claim.payload_len());
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_interleaved_single_unit(c: &mut Criterion) {
    let source = Uuid::new_v4();
    c.bench_function("interleaved_feed_next", |b| {
        let queue = BridgingQueue::new();
        b.iter(|| {
            queue.feed([InboundMessageUnit::text(source, "hello")]);
            if let NextResult::Ready(unit) = queue.next() {
                black_box(unit);
                queue.release();
            }
        });
    });
}

criterion_group!(
    benches,
    bench_feed_then_drain,
    bench_sequence_drain,
    bench_interleaved_single_unit
);
criterion_main!(benches);

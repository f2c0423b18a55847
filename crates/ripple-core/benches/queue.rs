//! Event queue benchmarks for ripple-core.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ripple_core::EventQueue;
use ripple_events::{EventPayload, FlagOp};

fn bench_push_collapsible(c: &mut Criterion) {
    let mut group = c.benchmark_group("push");
    group.throughput(Throughput::Elements(1_000));
    group.bench_function("pointer_1k", |b| {
        b.iter(|| {
            let mut queue = EventQueue::new("bench");
            for value in 0..1_000 {
                queue.push(black_box(EventPayload::Pointer { pointer: value }));
            }
            queue
        })
    });
    group.finish();
}

fn bench_push_plain(c: &mut Criterion) {
    let mut group = c.benchmark_group("push");
    group.throughput(Throughput::Elements(1_000));
    group.bench_function("alert_words_1k", |b| {
        b.iter(|| {
            let mut queue = EventQueue::new("bench");
            for _ in 0..1_000 {
                queue.push(black_box(EventPayload::AlertWords {
                    alert_words: vec!["word".into()],
                }));
            }
            queue
        })
    });
    group.finish();
}

fn bench_flag_merge(c: &mut Criterion) {
    c.bench_function("flag_merge_100x10", |b| {
        b.iter(|| {
            let mut queue = EventQueue::new("bench");
            for chunk in 0..100 {
                let base = chunk * 10;
                queue.push(black_box(EventPayload::UpdateMessageFlags {
                    flag: "read".into(),
                    operation: FlagOp::Add,
                    all: false,
                    messages: (base..base + 10).collect(),
                }));
            }
            queue
        })
    });
}

criterion_group!(benches, bench_push_collapsible, bench_push_plain, bench_flag_merge);
criterion_main!(benches);

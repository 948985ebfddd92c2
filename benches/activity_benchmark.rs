//! Criterion micro-benchmarks for the activity hot paths.

use criterion::{criterion_group, criterion_main, Criterion};
use polldrive::test_utils::QueueWakeupScheduler;
use polldrive::{make_activity, ContextSet, InlineWakeupScheduler, Outcome};
use std::hint::black_box;
use std::task::Poll;

fn bench_immediate_completion(c: &mut Criterion) {
    c.bench_function("activity/immediate_completion", |b| {
        b.iter(|| {
            let ptr = make_activity(
                || || Poll::Ready(1u64),
                InlineWakeupScheduler,
                |outcome: Outcome<u64>| {
                    black_box(outcome);
                },
                ContextSet::new(),
            );
            ptr.orphan();
        });
    });
}

fn bench_wakeup_repoll_cycle(c: &mut Criterion) {
    c.bench_function("activity/wakeup_repoll_cycle", |b| {
        let scheduler = QueueWakeupScheduler::new();
        let ptr = make_activity(
            || || Poll::<u64>::Pending,
            scheduler.clone(),
            |_: Outcome<u64>| {},
            ContextSet::new(),
        );
        b.iter(|| {
            ptr.force_wakeup();
            scheduler.drain();
        });
        ptr.orphan();
    });
}

fn bench_owning_waker_mint_and_drop(c: &mut Criterion) {
    c.bench_function("activity/owning_waker_mint_and_drop", |b| {
        let ptr = make_activity(
            || || Poll::<u64>::Pending,
            QueueWakeupScheduler::new(),
            |_: Outcome<u64>| {},
            ContextSet::new(),
        );
        b.iter(|| {
            let waker = ptr.make_owning_waker();
            black_box(&waker);
            drop(waker);
        });
        ptr.orphan();
    });
}

criterion_group!(
    benches,
    bench_immediate_completion,
    bench_wakeup_repoll_cycle,
    bench_owning_waker_mint_and_drop
);
criterion_main!(benches);

//! Non-owning waker safety: stragglers that outlive their activity must
//! fire into the void without touching freed state.

mod common;

use common::Completions;
use polldrive::test_utils::{init_test_logging, QueueWakeupScheduler};
use polldrive::{make_activity, CancelReason, ContextSet, Outcome};
use std::task::Poll;
use std::thread;

fn pending_activity(
    scheduler: &QueueWakeupScheduler,
    completions: &Completions<u32>,
) -> polldrive::ActivityPtr {
    make_activity(
        || || Poll::<u32>::Pending,
        scheduler.clone(),
        completions.recorder(),
        ContextSet::new(),
    )
}

#[test]
fn non_owning_waker_outlives_its_activity() {
    init_test_logging();
    let completions: Completions<u32> = Completions::new();
    let scheduler = QueueWakeupScheduler::new();
    let ptr = pending_activity(&scheduler, &completions);

    let straggler = ptr.make_non_owning_waker();
    ptr.orphan();
    assert_eq!(
        completions.take(),
        vec![Outcome::Cancelled(CancelReason::orphaned())]
    );

    // The activity is gone; waking from another thread has no effect and
    // touches no freed state.
    let waking_thread = thread::spawn(move || straggler.wake());
    waking_thread.join().expect("waking thread panicked");

    assert_eq!(scheduler.schedule_count(), 0);
    assert!(completions.is_empty());
}

#[test]
fn dropping_a_straggler_releases_it_quietly() {
    init_test_logging();
    let completions: Completions<u32> = Completions::new();
    let scheduler = QueueWakeupScheduler::new();
    let ptr = pending_activity(&scheduler, &completions);

    let first = ptr.make_non_owning_waker();
    let second = ptr.make_non_owning_waker();
    ptr.orphan();

    drop(first);
    second.wake();
    assert_eq!(completions.len(), 1);
}

#[test]
fn non_owning_wakers_delegate_while_the_activity_lives() {
    init_test_logging();
    let completions: Completions<u32> = Completions::new();
    let scheduler = QueueWakeupScheduler::new();
    let ptr = pending_activity(&scheduler, &completions);

    let waker = ptr.make_non_owning_waker();
    waker.wake();
    assert_eq!(scheduler.schedule_count(), 1);
    assert_eq!(scheduler.drain(), 1);

    ptr.orphan();
    assert_eq!(completions.len(), 1);
}

#[test]
fn non_owning_wakers_share_one_handle() {
    init_test_logging();
    let completions: Completions<u32> = Completions::new();
    let scheduler = QueueWakeupScheduler::new();
    let ptr = pending_activity(&scheduler, &completions);

    // All non-owning wakers of one activity point at the same handle;
    // owning wakers point at the activity itself.
    let non_owning_a = ptr.make_non_owning_waker();
    let non_owning_b = ptr.make_non_owning_waker();
    let owning = ptr.make_owning_waker();
    assert_eq!(non_owning_a, non_owning_b);
    assert_ne!(non_owning_a, owning);

    drop(non_owning_a);
    drop(non_owning_b);
    owning.wake();
    assert_eq!(scheduler.drain(), 1);
    ptr.orphan();
}

#[test]
fn owning_waker_keeps_a_done_activity_reachable() {
    init_test_logging();
    let completions: Completions<u32> = Completions::new();
    let scheduler = QueueWakeupScheduler::new();
    let ptr = pending_activity(&scheduler, &completions);

    let owning = ptr.make_owning_waker();
    ptr.orphan();
    assert_eq!(completions.len(), 1);

    // The owning waker still holds the (completed) activity; waking it
    // schedules a run that observes completion and does nothing.
    owning.wake();
    assert_eq!(scheduler.schedule_count(), 1);
    assert_eq!(scheduler.drain(), 1);
    assert_eq!(completions.len(), 1);
}

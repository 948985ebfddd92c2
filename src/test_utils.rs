//! Test support: logging initialization and deterministic schedulers.
//!
//! These helpers are public so downstream crates can drive activities
//! deterministically in their own tests:
//!
//! ```rust,ignore
//! let scheduler = QueueWakeupScheduler::new();
//! let ptr = make_activity(factory, scheduler.clone(), on_done, ContextSet::new());
//! ptr.force_wakeup();
//! assert_eq!(scheduler.drain(), 1);
//! ```

use crate::scheduler::{ScheduledWakeup, WakeupScheduler};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Initializes trace-level test logging.
///
/// Safe to call from every test; only the first call installs the
/// subscriber. Without the `tracing-integration` feature this is a no-op.
#[cfg(feature = "tracing-integration")]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();
    });
}

/// Initializes trace-level test logging (no-op without the
/// `tracing-integration` feature).
#[cfg(not(feature = "tracing-integration"))]
pub fn init_test_logging() {}

#[derive(Default)]
struct QueueInner {
    queue: Mutex<VecDeque<ScheduledWakeup>>,
    scheduled: AtomicUsize,
}

/// A deterministic scheduler that queues wakeups for manual draining.
///
/// Tests keep a clone, let activities schedule against it, and decide
/// exactly when (and on which thread) the repolls run by calling
/// [`drain`](QueueWakeupScheduler::drain). The schedule-call counter makes
/// coalescing observable.
#[derive(Clone, Default)]
pub struct QueueWakeupScheduler {
    inner: Arc<QueueInner>,
}

impl QueueWakeupScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of `schedule_wakeup` calls observed.
    #[must_use]
    pub fn schedule_count(&self) -> usize {
        self.inner.scheduled.load(Ordering::SeqCst)
    }

    /// Returns the number of queued, not yet run, wakeups.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Runs every queued wakeup, including ones enqueued while draining.
    ///
    /// Returns how many wakeups ran. Each token is run with the queue
    /// lock released, so repolls may schedule follow-up wakeups freely.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.inner.queue.lock().pop_front();
            match next {
                Some(wakeup) => {
                    wakeup.run();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl WakeupScheduler for QueueWakeupScheduler {
    fn schedule_wakeup(&self, wakeup: ScheduledWakeup) {
        self.inner.scheduled.fetch_add(1, Ordering::SeqCst);
        self.inner.queue.lock().push_back(wakeup);
    }
}

impl std::fmt::Debug for QueueWakeupScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueWakeupScheduler")
            .field("scheduled", &self.schedule_count())
            .field("pending", &self.pending())
            .finish()
    }
}

/// A scheduler that fails the test if any wakeup is ever scheduled.
///
/// For asserting that a path never leaves the activity quiescent with a
/// pending run — immediately-ready promises, self-wakeups folded into the
/// running pass, and similar.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicWakeupScheduler;

impl WakeupScheduler for PanicWakeupScheduler {
    fn schedule_wakeup(&self, _wakeup: ScheduledWakeup) {
        panic!("unexpected wakeup scheduled");
    }
}

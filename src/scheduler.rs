//! Pluggable wakeup scheduling.
//!
//! When an external wakeup reaches a quiescent activity, the activity does
//! not repoll on the waking thread by default: it asks its
//! [`WakeupScheduler`] to arrange the repoll — inline, on a thread pool,
//! behind an event loop, wherever the embedding wants promise code to run.

use crate::tracing_compat::warn;
use std::fmt;
use std::sync::Arc;

/// Internal driver interface the scheduler token runs against.
pub(crate) trait RunnableActivity: Send + Sync {
    fn run_scheduled_wakeup(&self);
}

/// Strategy deciding where and when a woken activity repolls.
///
/// # Contract
///
/// - Arrange for [`ScheduledWakeup::run`] to be invoked exactly once,
///   later, on some thread.
/// - The token holds a strong reference, so the activity is guaranteed
///   live until the run happens.
/// - An activity is never handed out twice concurrently: no further token
///   for the same activity is produced until the previous one has run.
/// - The token must not be run while the scheduling thread holds that
///   activity's lock. Wakeups fired from inside an activity's own poll
///   never reach the scheduler (they are folded into the running pass),
///   so in practice this only constrains exotic inline embeddings.
pub trait WakeupScheduler: Send + Sync + 'static {
    /// Schedules `wakeup` to run later.
    fn schedule_wakeup(&self, wakeup: ScheduledWakeup);
}

/// A run-once token for a scheduled repoll.
///
/// Carries the strong reference that keeps the activity alive across the
/// scheduling window. Dropping the token without running it releases that
/// reference but leaves the activity unable to repoll — always a scheduler
/// defect, so the drop path logs a warning.
pub struct ScheduledWakeup {
    activity: Option<Arc<dyn RunnableActivity>>,
}

impl ScheduledWakeup {
    pub(crate) fn new(activity: Arc<dyn RunnableActivity>) -> Self {
        Self {
            activity: Some(activity),
        }
    }

    /// Repolls the activity to quiescence, consuming the token.
    pub fn run(mut self) {
        if let Some(activity) = self.activity.take() {
            activity.run_scheduled_wakeup();
        }
    }
}

impl Drop for ScheduledWakeup {
    fn drop(&mut self) {
        if self.activity.take().is_some() {
            warn!("scheduled wakeup dropped without running; its activity will never repoll");
        }
    }
}

impl fmt::Debug for ScheduledWakeup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledWakeup")
            .field("pending", &self.activity.is_some())
            .finish()
    }
}

/// Runs every wakeup immediately on the waking thread.
///
/// The repoll happens inside [`schedule_wakeup`], so the waking call does
/// not return until the activity is quiescent again. Suitable for tests
/// and single-threaded drivers. Unsuitable when wakers fire from inside
/// other activities' polls: the inline repoll then nests one activity's
/// lock inside another's.
///
/// [`schedule_wakeup`]: WakeupScheduler::schedule_wakeup
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineWakeupScheduler;

impl WakeupScheduler for InlineWakeupScheduler {
    fn schedule_wakeup(&self, wakeup: ScheduledWakeup) {
        wakeup.run();
    }
}

//! The indirection behind non-owning wakers.

use crate::tracing_compat::trace;
use crate::waker::Wakeable;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// A stable wake target whose liveness is decoupled from its activity's.
///
/// Non-owning wakers hold a strong reference to the handle; the handle
/// holds only a weak association with the activity. The two refcounts are
/// independent — there is no co-ownership cycle — so a wake that arrives
/// long after the activity is gone simply fails the upgrade and consumes
/// the token.
///
/// The activity severs the association during teardown, before releasing
/// its own reference to the handle; later wakes then skip the upgrade
/// entirely.
pub(crate) struct WakeHandle {
    activity: Mutex<Option<Weak<dyn Wakeable>>>,
}

impl WakeHandle {
    pub(crate) fn new(activity: Weak<dyn Wakeable>) -> Self {
        Self {
            activity: Mutex::new(Some(activity)),
        }
    }

    /// Severs the association with the activity.
    pub(crate) fn sever(&self) {
        *self.activity.lock() = None;
    }
}

impl Wakeable for WakeHandle {
    fn wake(self: Arc<Self>) {
        // Copy the association out and upgrade outside the lock: the wake
        // path must not hold the slot lock while the activity repolls (an
        // inline scheduler would re-enter through it).
        let weak = self.activity.lock().clone();
        match weak.and_then(|weak| weak.upgrade()) {
            Some(activity) => activity.wake(),
            None => trace!("non-owning wake after activity teardown; ignoring"),
        }
    }

    fn discard(self: Arc<Self>) {}
}

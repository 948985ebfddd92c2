//! Activities: single-promise, cancellable, externally wakeable tasks.
//!
//! An activity drives one [`Promise`] to completion under a lock. External
//! threads request repolls through [`Waker`]s minted by the activity; the
//! promise itself can demand an immediate repoll; the owner cancels by
//! dropping (or explicitly orphaning) the [`ActivityPtr`]. A pluggable
//! [`WakeupScheduler`] decides where repolls run. On completion the
//! `on_done` callback is invoked exactly once — with the converted promise
//! payload or a cancellation reason — always outside the lock.
//!
//! # Wakeup flow
//!
//! A producer fires a [`Waker`] → the activity asks its scheduler for a
//! run (or coalesces into one already pending) → the scheduler later runs
//! the [`ScheduledWakeup`] token → the activity locks, installs its
//! contexts and the thread-local current-activity marker, and polls the
//! promise until it settles.
//!
//! # Reentrancy
//!
//! The only reentrancy allowed is self-wakeup: a wakeup or cancellation
//! arriving from inside the activity's own poll, on the polling thread, is
//! folded into the running pass (cancel taking priority over wakeup)
//! instead of being rescheduled.

mod handle;

use crate::context::ContextSet;
use crate::promise::{IntoCompletion, Promise, PromiseFactory};
use crate::scheduler::{RunnableActivity, ScheduledWakeup, WakeupScheduler};
use crate::tracing_compat::{debug, trace};
use crate::types::{CancelReason, Outcome};
use crate::waker::{Wakeable, Waker};
use handle::WakeHandle;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::task::Poll;

/// Opaque identity of an activity, stable for its lifetime.
///
/// Identities may be reused after an activity is destroyed; they are for
/// comparing live activities, not for long-term bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActivityId(usize);

/// The operations a live activity exposes to promises and integrations.
pub trait Activity: Send + Sync {
    /// Returns this activity's identity.
    fn id(&self) -> ActivityId;

    /// Mints a waker that keeps this activity alive until it fires or is
    /// dropped.
    fn make_owning_waker(&self) -> Waker;

    /// Mints a waker that does not keep this activity alive.
    ///
    /// Firing it after the activity is gone is a safe no-op, which suits
    /// wakeups that may not be delivered until long after the activity
    /// should have been destroyed.
    fn make_non_owning_waker(&self) -> Waker;

    /// Forces a repoll from the outside, without holding a waker.
    ///
    /// Rarely needed — prefer minting a waker and firing it; this exists
    /// for integrations that only hold the activity itself.
    fn force_wakeup(&self) {
        self.make_owning_waker().wake();
    }

    /// Records that the poll in flight should run again immediately if
    /// the promise does not complete.
    ///
    /// Must be called from inside this activity's poll, on the polling
    /// thread.
    fn force_immediate_repoll(&self);
}

/// A shared reference to a live activity, as returned by [`current`].
#[derive(Clone)]
pub struct ActivityRef {
    inner: Arc<dyn Activity>,
}

impl std::ops::Deref for ActivityRef {
    type Target = dyn Activity;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl PartialEq for ActivityRef {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id() == other.inner.id()
    }
}

impl Eq for ActivityRef {}

impl fmt::Debug for ActivityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityRef")
            .field("id", &self.inner.id())
            .finish()
    }
}

/// Owner side of an activity.
///
/// Dropping the pointer *orphans* the activity: the promise is cancelled
/// if it has not completed, and the owner's reference is released.
/// Outstanding owning wakers keep the (by then completed) activity's
/// memory alive until they resolve; non-owning wakers never do.
///
/// Dereferences to [`Activity`] for waker minting and forced wakeups.
pub struct ActivityPtr {
    inner: Arc<dyn DriveableActivity>,
}

impl ActivityPtr {
    /// Cancels the activity if still running and releases it.
    ///
    /// Equivalent to dropping the pointer; the explicit form reads better
    /// at call sites that cancel deliberately.
    pub fn orphan(self) {}
}

impl std::ops::Deref for ActivityPtr {
    type Target = dyn Activity;

    fn deref(&self) -> &Self::Target {
        self.inner.as_activity()
    }
}

impl Drop for ActivityPtr {
    fn drop(&mut self) {
        self.inner.cancel();
    }
}

impl fmt::Debug for ActivityPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityPtr")
            .field("id", &self.inner.as_activity().id())
            .finish()
    }
}

/// Owner-facing operations, object-safe so `ActivityPtr` can erase the
/// promise, scheduler, and callback types.
pub(crate) trait DriveableActivity: Send + Sync {
    fn cancel(&self);
    fn as_activity(&self) -> &(dyn Activity + 'static);
}

// ---------------------------------------------------------------------------
// Thread-local current activity
// ---------------------------------------------------------------------------

struct Frame {
    activity: Arc<dyn Activity>,
    id: ActivityId,
    contexts: ContextSet,
}

thread_local! {
    /// Stack of activities polling on this thread, innermost last.
    static CURRENT_ACTIVITIES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Returns the activity currently polling on this thread, if any.
///
/// `Some` exactly while a poll (or a cancelled promise's teardown) runs on
/// this thread; nested activities shadow their outers and are restored
/// when the inner poll finishes.
#[must_use]
pub fn current() -> Option<ActivityRef> {
    CURRENT_ACTIVITIES.with(|stack| {
        stack.borrow().last().map(|frame| ActivityRef {
            inner: Arc::clone(&frame.activity),
        })
    })
}

/// Runs `f` against the current activity's contexts, if inside a poll.
pub(crate) fn with_ambient_contexts<R>(f: impl FnOnce(&ContextSet) -> R) -> Option<R> {
    CURRENT_ACTIVITIES.with(|stack| {
        let stack = stack.borrow();
        stack.last().map(|frame| f(&frame.contexts))
    })
}

fn current_activity_id() -> Option<ActivityId> {
    CURRENT_ACTIVITIES.with(|stack| stack.borrow().last().map(|frame| frame.id))
}

/// Installs an activity as current on this thread; the frame is popped on
/// exit, including unwinds. `finish` returns the contexts so the caller
/// can store them back into the activity between polls.
struct ScopedActivity {
    /// Set when no frame was pushed (the activity had no live strong
    /// reference, a broken invariant tolerated in release builds); the
    /// contexts then ride in the guard instead of a frame.
    parked: Option<ContextSet>,
}

impl ScopedActivity {
    fn enter(activity: Option<Arc<dyn Activity>>, id: ActivityId, contexts: ContextSet) -> Self {
        let Some(activity) = activity else {
            return Self {
                parked: Some(contexts),
            };
        };
        CURRENT_ACTIVITIES.with(|stack| {
            stack.borrow_mut().push(Frame {
                activity,
                id,
                contexts,
            });
        });
        Self { parked: None }
    }

    fn finish(mut self) -> ContextSet {
        if let Some(contexts) = self.parked.take() {
            std::mem::forget(self);
            return contexts;
        }
        let frame = CURRENT_ACTIVITIES.with(|stack| stack.borrow_mut().pop());
        std::mem::forget(self);
        debug_assert!(frame.is_some(), "current-activity stack underflow");
        frame.map(|frame| frame.contexts).unwrap_or_default()
    }
}

impl Drop for ScopedActivity {
    fn drop(&mut self) {
        if self.parked.is_none() {
            CURRENT_ACTIVITIES.with(|stack| {
                stack.borrow_mut().pop();
            });
        }
    }
}

// ---------------------------------------------------------------------------
// The promise activity
// ---------------------------------------------------------------------------

/// Action accumulated while a poll pass is running.
///
/// More than one action during a pass merges by maximum, so cancellation
/// overrides wakeup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
enum ActionDuringRun {
    None = 0,
    Wakeup = 1,
    Cancel = 2,
}

impl ActionDuringRun {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Wakeup,
            _ => Self::Cancel,
        }
    }
}

/// State guarded by the activity lock.
struct ActivityState<P, Done> {
    /// The promise being driven. `None` before the factory has run and
    /// again once the activity is done.
    promise: Option<P>,
    /// Monotonic: once true, the promise is destroyed and never polled.
    done: bool,
    /// Taken exactly once, at completion or cancellation.
    on_done: Option<Done>,
    /// Parked here between polls; ambient in the thread-local frame while
    /// a poll (or cancel-side teardown) runs.
    contexts: ContextSet,
}

/// A task driving one promise to completion.
///
/// Shared as `Arc<Self>`: the strong count is the activity's refcount.
/// The owning [`ActivityPtr`] holds the initial reference; owning wakers,
/// scheduler tokens, and thread-local frames each hold one more.
struct PromiseActivity<P, Sch, Done, S> {
    /// All promise execution happens under this lock.
    state: Mutex<ActivityState<P, Done>>,
    /// Max-merged [`ActionDuringRun`]. Written only with the lock held
    /// (the reentrant paths run on the polling thread, which holds it);
    /// atomic so those paths do not alias the poll's borrow of `state`.
    action_during_run: AtomicU8,
    /// True while a scheduler run has been requested and not yet started.
    wakeup_scheduled: AtomicBool,
    /// Lazily created target for non-owning wakers. Leaf lock: nothing is
    /// acquired while it is held.
    handle: Mutex<Option<Arc<WakeHandle>>>,
    /// Decides where scheduled repolls run.
    scheduler: Sch,
    /// Installed at construction; upgrading succeeds while any strong
    /// reference (including the frame's) exists.
    self_weak: Weak<Self>,
    _completion: PhantomData<fn(S)>,
}

impl<P, Sch, Done, S> PromiseActivity<P, Sch, Done, S>
where
    P: Promise + Send + 'static,
    P::Output: IntoCompletion<S>,
    Sch: WakeupScheduler,
    Done: FnOnce(Outcome<S>) + Send + 'static,
    S: 'static,
{
    fn new(scheduler: Sch, on_done: Done, contexts: ContextSet) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            state: Mutex::new(ActivityState {
                promise: None,
                done: false,
                on_done: Some(on_done),
                contexts,
            }),
            action_during_run: AtomicU8::new(ActionDuringRun::None as u8),
            wakeup_scheduled: AtomicBool::new(false),
            handle: Mutex::new(None),
            scheduler,
            self_weak: weak.clone(),
            _completion: PhantomData,
        })
    }

    /// Builds the promise from its factory and polls it to quiescence.
    ///
    /// Runs under the lock even though the activity was just constructed:
    /// the first poll can reach wakers that expose the activity to other
    /// threads.
    fn start<Fac>(&self, factory: Fac)
    where
        Fac: PromiseFactory<Promise = P>,
    {
        let mut state = self.state.lock();
        let scope = self.enter(&mut state);
        state.promise = Some(factory.into_promise());
        let completion = self.step_loop(&mut state);
        Self::leave(scope, &mut state);
        drop(state);
        if let Some((on_done, outcome)) = completion {
            on_done(outcome);
        }
    }

    /// Repolls in response to a scheduled wakeup.
    fn step(&self) {
        let mut state = self.state.lock();
        if state.done {
            // Spurious wakeup after completion.
            trace!(activity = ?self.activity_id(), "wakeup after completion; ignoring");
            return;
        }
        let scope = self.enter(&mut state);
        let completion = self.step_loop(&mut state);
        Self::leave(scope, &mut state);
        drop(state);
        if let Some((on_done, outcome)) = completion {
            on_done(outcome);
        }
    }

    /// Polls the promise until it settles: completes, runs out of
    /// wakeups, or observes a cancellation recorded during the pass.
    fn step_loop(&self, state: &mut ActivityState<P, Done>) -> Option<(Done, Outcome<S>)> {
        loop {
            debug_assert!(!state.done);
            let Some(promise) = state.promise.as_mut() else {
                debug_assert!(false, "promise polled after completion");
                return None;
            };
            match promise.poll() {
                Poll::Ready(value) => {
                    return self
                        .mark_done(state)
                        .map(|on_done| (on_done, Outcome::Ok(value.into_completion())));
                }
                Poll::Pending => match self.take_action_during_run() {
                    ActionDuringRun::None => return None,
                    ActionDuringRun::Wakeup => {}
                    ActionDuringRun::Cancel => {
                        return self.mark_done(state).map(|on_done| {
                            (on_done, Outcome::Cancelled(CancelReason::internal()))
                        });
                    }
                },
            }
        }
    }

    /// Flags completion and destroys the promise in place. Every later
    /// wakeup becomes a no-op. Returns the completion callback for the
    /// caller to invoke after releasing the lock; `None` means the
    /// callback was already taken — a double completion, caught by the
    /// debug assertion and swallowed in release builds.
    fn mark_done(&self, state: &mut ActivityState<P, Done>) -> Option<Done> {
        debug_assert!(!state.done, "activity completed twice");
        state.done = true;
        state.promise = None;
        debug!(activity = ?self.activity_id(), "activity done");
        state.on_done.take()
    }

    /// Owner-side cancellation.
    ///
    /// From inside this activity's own poll it only records the action;
    /// the poll loop observes it when the current promise invocation
    /// returns. From anywhere else it serializes on the lock with any
    /// in-flight poll and completes the activity as cancelled.
    fn cancel_from_owner(&self) {
        if self.is_current() {
            self.set_action_during_run(ActionDuringRun::Cancel);
            return;
        }
        let mut state = self.state.lock();
        if state.done {
            return;
        }
        debug!(activity = ?self.activity_id(), "activity orphaned before completion");
        // The promise is torn down with this activity current and its
        // contexts ambient: teardown code may still consult them.
        let scope = self.enter(&mut state);
        let on_done = self.mark_done(&mut state);
        Self::leave(scope, &mut state);
        drop(state);
        if let Some(on_done) = on_done {
            on_done(Outcome::Cancelled(CancelReason::orphaned()));
        }
    }

    fn enter(&self, state: &mut ActivityState<P, Done>) -> ScopedActivity {
        let contexts = std::mem::take(&mut state.contexts);
        let this = self.self_weak.upgrade();
        debug_assert!(this.is_some(), "activity polled with no live references");
        ScopedActivity::enter(
            this.map(|this| this as Arc<dyn Activity>),
            self.activity_id(),
            contexts,
        )
    }

    fn leave(scope: ScopedActivity, state: &mut ActivityState<P, Done>) {
        state.contexts = scope.finish();
    }

    fn activity_id(&self) -> ActivityId {
        ActivityId(Weak::as_ptr(&self.self_weak) as *const () as usize)
    }

    fn is_current(&self) -> bool {
        current_activity_id() == Some(self.activity_id())
    }

    fn set_action_during_run(&self, action: ActionDuringRun) {
        self.action_during_run
            .fetch_max(action as u8, Ordering::AcqRel);
    }

    fn take_action_during_run(&self) -> ActionDuringRun {
        ActionDuringRun::from_u8(
            self.action_during_run
                .swap(ActionDuringRun::None as u8, Ordering::AcqRel),
        )
    }
}

impl<P, Sch, Done, S> Wakeable for PromiseActivity<P, Sch, Done, S>
where
    P: Promise + Send + 'static,
    P::Output: IntoCompletion<S>,
    Sch: WakeupScheduler,
    Done: FnOnce(Outcome<S>) + Send + 'static,
    S: 'static,
{
    /// External repoll request. The consumed `Arc` is the waking
    /// reference; it is released once the wakeup has been accounted for.
    fn wake(self: Arc<Self>) {
        if self.is_current() {
            // Wakeup from inside our own poll: fold it into the pass.
            self.set_action_during_run(ActionDuringRun::Wakeup);
            return;
        }
        if self.wakeup_scheduled.swap(true, Ordering::AcqRel) {
            trace!(activity = ?self.activity_id(), "wakeup coalesced into pending run");
        } else {
            trace!(activity = ?self.activity_id(), "wakeup scheduled");
            // The token carries its own reference across the scheduling
            // window; the waking reference is released on return.
            let token = ScheduledWakeup::new(Arc::clone(&self) as Arc<dyn RunnableActivity>);
            self.scheduler.schedule_wakeup(token);
        }
    }

    fn discard(self: Arc<Self>) {}
}

impl<P, Sch, Done, S> RunnableActivity for PromiseActivity<P, Sch, Done, S>
where
    P: Promise + Send + 'static,
    P::Output: IntoCompletion<S>,
    Sch: WakeupScheduler,
    Done: FnOnce(Outcome<S>) + Send + 'static,
    S: 'static,
{
    fn run_scheduled_wakeup(&self) {
        let was_scheduled = self.wakeup_scheduled.swap(false, Ordering::AcqRel);
        debug_assert!(was_scheduled, "scheduled wakeup ran without a pending request");
        self.step();
    }
}

impl<P, Sch, Done, S> Activity for PromiseActivity<P, Sch, Done, S>
where
    P: Promise + Send + 'static,
    P::Output: IntoCompletion<S>,
    Sch: WakeupScheduler,
    Done: FnOnce(Outcome<S>) + Send + 'static,
    S: 'static,
{
    fn id(&self) -> ActivityId {
        self.activity_id()
    }

    fn make_owning_waker(&self) -> Waker {
        let this = self.self_weak.upgrade();
        debug_assert!(this.is_some(), "waker minted from a dead activity");
        this.map_or_else(Waker::empty, |this| Waker::new(this as Arc<dyn Wakeable>))
    }

    fn make_non_owning_waker(&self) -> Waker {
        let mut slot = self.handle.lock();
        let handle = slot.get_or_insert_with(|| {
            let weak: Weak<dyn Wakeable> = self.self_weak.clone();
            Arc::new(WakeHandle::new(weak))
        });
        Waker::new(Arc::clone(handle) as Arc<dyn Wakeable>)
    }

    fn force_immediate_repoll(&self) {
        debug_assert!(
            self.is_current(),
            "force_immediate_repoll called outside this activity's poll"
        );
        self.set_action_during_run(ActionDuringRun::Wakeup);
    }
}

impl<P, Sch, Done, S> DriveableActivity for PromiseActivity<P, Sch, Done, S>
where
    P: Promise + Send + 'static,
    P::Output: IntoCompletion<S>,
    Sch: WakeupScheduler,
    Done: FnOnce(Outcome<S>) + Send + 'static,
    S: 'static,
{
    fn cancel(&self) {
        self.cancel_from_owner();
    }

    fn as_activity(&self) -> &(dyn Activity + 'static) {
        self
    }
}

impl<P, Sch, Done, S> Drop for PromiseActivity<P, Sch, Done, S> {
    fn drop(&mut self) {
        // Sever the non-owning handle before the memory goes away; wakes
        // that raced past the weak count observe the cleared slot.
        if let Some(handle) = self.handle.get_mut().take() {
            handle.sever();
        }
        debug_assert!(
            self.state.get_mut().done,
            "activity destroyed without completing or cancelling"
        );
    }
}

/// Creates an activity driving the promise produced by `promise_factory`.
///
/// The factory runs and the promise is polled once before this returns,
/// under the activity's lock and with `contexts` ambient. A promise that
/// is immediately ready therefore completes here: `on_done` runs on the
/// calling thread and the scheduler is never involved.
///
/// `on_done` is invoked exactly once per activity — with the promise's
/// converted payload, or with a [`CancelReason`] if the activity is
/// orphaned or the promise cancels itself first — from whichever thread
/// drives the completing poll, and never under the activity's lock.
pub fn make_activity<Fac, Sch, Done, S>(
    promise_factory: Fac,
    scheduler: Sch,
    on_done: Done,
    contexts: ContextSet,
) -> ActivityPtr
where
    Fac: PromiseFactory,
    Fac::Promise: Send + 'static,
    <Fac::Promise as Promise>::Output: IntoCompletion<S>,
    Sch: WakeupScheduler,
    Done: FnOnce(Outcome<S>) + Send + 'static,
    S: 'static,
{
    let activity = PromiseActivity::new(scheduler, on_done, contexts);
    activity.start(promise_factory);
    ActivityPtr { inner: activity }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::PanicWakeupScheduler;

    #[test]
    fn no_current_activity_outside_polls() {
        assert!(current().is_none());
    }

    #[test]
    fn current_is_set_during_the_first_poll() {
        let observed = std::sync::Arc::new(Mutex::new(None));
        let slot = std::sync::Arc::clone(&observed);
        let ptr = make_activity(
            move || {
                move || {
                    *slot.lock() = current().map(|activity| activity.id());
                    Poll::Ready(())
                }
            },
            PanicWakeupScheduler,
            |_: Outcome<()>| {},
            ContextSet::new(),
        );
        assert_eq!(*observed.lock(), Some(ptr.id()));
        assert!(current().is_none());
        ptr.orphan();
    }
}

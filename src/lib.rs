//! Polldrive: a promise-driven task runtime core.
//!
//! # Overview
//!
//! Polldrive turns pollable, stack-less state machines (*promises*) into
//! independently schedulable, cancellable tasks (*activities*). An activity
//! drives exactly one promise to completion under a lock. Any number of
//! external threads may request repolls through one-shot [`Waker`]s; the
//! promise itself can demand an immediate repoll; the owner cancels by
//! dropping the [`ActivityPtr`]. Where and when a repoll actually runs is
//! delegated to a pluggable [`WakeupScheduler`].
//!
//! # Core Guarantees
//!
//! - **Exactly-once completion**: the completion callback runs exactly once
//!   per activity, with the promise's converted payload or a cancellation
//!   reason, always outside the activity's lock.
//! - **Coalesced wakeups**: any number of wakeups between two runs produce
//!   at most one scheduler call; the rest resolve immediately.
//! - **No lost wakeups**: a wakeup that lands while a poll is in flight
//!   forces another pass instead of vanishing.
//! - **Cancellation dominates**: when a cancel and a wakeup land in the
//!   same pass, the activity cancels.
//! - **Safe stragglers**: non-owning wakers may outlive their activity and
//!   fire into the void without touching freed state.
//!
//! # Module Structure
//!
//! - [`waker`]: one-shot wake capabilities, the owning [`Waker`] handle,
//!   and the replace-and-wake [`AtomicWaker`] slot
//! - [`promise`]: the polling protocol and the completion conversion seam
//! - [`activity`]: the activity state machine, owning pointer, and the
//!   ambient current-activity accessor
//! - [`scheduler`]: the wakeup scheduling contract and an inline strategy
//! - [`context`]: type-indexed contexts made ambient during polls
//! - [`types`]: cancellation reasons and completion outcomes
//! - [`tracing_compat`]: feature-gated structured logging facade
//! - [`test_utils`]: deterministic schedulers and logging init for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

pub mod activity;
pub mod context;
pub mod promise;
pub mod scheduler;
pub mod test_utils;
pub mod tracing_compat;
pub mod types;
pub mod waker;

pub use activity::{current, make_activity, Activity, ActivityId, ActivityPtr, ActivityRef};
pub use context::{has_context, with_context, with_context_mut, ContextSet};
pub use promise::{IntoCompletion, Promise, PromiseFactory};
pub use scheduler::{InlineWakeupScheduler, ScheduledWakeup, WakeupScheduler};
pub use types::{CancelKind, CancelReason, Outcome};
pub use waker::{AtomicWaker, Wakeable, Waker};

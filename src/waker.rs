//! One-shot wake capabilities and the handles that own them.
//!
//! A [`Wakeable`] is a single-use capability: "wake the activity behind
//! this token" or "discard the token without waking". A [`Waker`] owns one
//! token and guarantees it receives exactly one terminal call. An
//! [`AtomicWaker`] is an address-stable slot holding one waker, where
//! installing a replacement wakes the waker it displaces.

use parking_lot::Mutex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A one-shot wake capability.
///
/// Exactly one of [`wake`](Wakeable::wake) or [`discard`](Wakeable::discard)
/// is invoked per token, exactly once. The consuming `Arc<Self>` receiver
/// is the token: the strong reference travels with the call, so whatever
/// the capability keeps alive is released when the call returns.
pub trait Wakeable: Send + Sync {
    /// Wakes the underlying activity.
    fn wake(self: Arc<Self>);

    /// Discards this token without waking.
    fn discard(self: Arc<Self>);
}

/// An owning handle to a [`Wakeable`].
///
/// Move-only. [`wake`](Waker::wake) consumes the token and fires it;
/// dropping an unfired waker discards the token instead. An empty waker
/// (default-constructed, or the source of a move) is inert: waking it does
/// nothing.
///
/// Equality and hashing are by wakeable identity, so two wakers minted
/// against the same wake target compare equal, and all empty wakers
/// compare equal.
#[derive(Default)]
pub struct Waker {
    wakeable: Option<Arc<dyn Wakeable>>,
}

impl Waker {
    /// Creates a waker owning the given wake token.
    #[must_use]
    pub fn new(wakeable: Arc<dyn Wakeable>) -> Self {
        Self {
            wakeable: Some(wakeable),
        }
    }

    /// Creates an empty waker. Waking it is a no-op.
    #[must_use]
    pub const fn empty() -> Self {
        Self { wakeable: None }
    }

    /// Wakes the underlying activity, consuming the token.
    pub fn wake(mut self) {
        if let Some(wakeable) = self.wakeable.take() {
            wakeable.wake();
        }
    }

    /// Returns true if this waker still holds a live token.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.wakeable.is_some()
    }

    fn identity(&self) -> *const () {
        self.wakeable
            .as_ref()
            .map_or(std::ptr::null(), |wakeable| Arc::as_ptr(wakeable).cast())
    }
}

impl Drop for Waker {
    fn drop(&mut self) {
        if let Some(wakeable) = self.wakeable.take() {
            wakeable.discard();
        }
    }
}

impl PartialEq for Waker {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.identity(), other.identity())
    }
}

impl Eq for Waker {}

impl Hash for Waker {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.identity() as usize).hash(state);
    }
}

impl fmt::Debug for Waker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waker")
            .field("armed", &self.is_armed())
            .finish()
    }
}

/// An address-stable single-slot waker cell.
///
/// [`set`](AtomicWaker::set) installs a replacement and *wakes* the waker
/// it displaces, which suits hand-off points of the form "replace the
/// pending notifier; the previous one should fire now". The cell is meant
/// to be shared in place (behind an `Arc` or a borrow), not moved.
///
/// Dropping the cell discards the held waker without waking it.
pub struct AtomicWaker {
    slot: Mutex<Waker>,
}

impl AtomicWaker {
    /// Creates an empty cell.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Waker::empty()),
        }
    }

    /// Installs a new waker and wakes the one it displaces.
    pub fn set(&self, waker: Waker) {
        let evicted = std::mem::replace(&mut *self.slot.lock(), waker);
        // The lock is released before the displaced waker fires.
        evicted.wake();
    }

    /// Extracts and fires the held waker.
    pub fn wake(&self) {
        let waker = std::mem::take(&mut *self.slot.lock());
        waker.wake();
    }

    /// Returns true if the slot currently holds a live token.
    ///
    /// Advisory only: the answer may be stale by the time it is observed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.slot.lock().is_armed()
    }
}

impl Default for AtomicWaker {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Waker> for AtomicWaker {
    fn from(waker: Waker) -> Self {
        Self {
            slot: Mutex::new(waker),
        }
    }
}

impl fmt::Debug for AtomicWaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicWaker")
            .field("armed", &self.is_armed())
            .finish()
    }
}

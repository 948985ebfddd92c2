//! Type-indexed ambient contexts.
//!
//! An activity carries a set of context values keyed by type. During every
//! poll — and while a cancelled promise is being torn down — the set is
//! made ambient on the polling thread, so promise code can locate a
//! context by naming its type:
//!
//! ```rust,ignore
//! with_context::<Deadline, _>(|deadline| deadline.remaining())
//! ```
//!
//! Outside those windows the accessors return `None`. Nested activities on
//! one thread each see their own set; the outer activity's contexts are
//! restored when the inner poll finishes.
//!
//! Accessors are closure-style: no reference escapes the poll. Accessing
//! the *same* context type reentrantly from inside an accessor closure is
//! a borrow violation and panics; distinct types nest freely.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

enum ContextEntry {
    /// Held by value; mutable through [`with_context_mut`].
    Owned(Box<dyn Any + Send>),
    /// Shared handle; immutable access only.
    Shared(Arc<dyn Any + Send + Sync>),
}

impl ContextEntry {
    fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Self::Owned(value) => value.downcast_ref(),
            Self::Shared(value) => value.downcast_ref(),
        }
    }

    fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        match self {
            Self::Owned(value) => value.downcast_mut(),
            Self::Shared(_) => None,
        }
    }
}

/// The contexts injected into one activity.
///
/// Built by the caller of [`make_activity`](crate::make_activity); at most
/// one entry per type. Entries are either owned values (mutable during
/// polls) or shared handles (immutable, usable to observe the context from
/// outside the activity as well).
#[derive(Default)]
pub struct ContextSet {
    entries: HashMap<TypeId, RefCell<ContextEntry>>,
}

impl ContextSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a context held by value, replacing any previous entry of the
    /// same type.
    #[must_use]
    pub fn with_value<T: Send + 'static>(mut self, value: T) -> Self {
        self.entries.insert(
            TypeId::of::<T>(),
            RefCell::new(ContextEntry::Owned(Box::new(value))),
        );
        self
    }

    /// Adds a shared context handle, replacing any previous entry of the
    /// same type.
    #[must_use]
    pub fn with_shared<T: Send + Sync + 'static>(mut self, value: Arc<T>) -> Self {
        self.entries.insert(
            TypeId::of::<T>(),
            RefCell::new(ContextEntry::Shared(value)),
        );
        self
    }

    /// Returns the number of contexts in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the set holds no contexts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if the set holds a context of type `T`.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    pub(crate) fn with<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let cell = self.entries.get(&TypeId::of::<T>())?;
        let entry = cell.borrow();
        entry.downcast_ref::<T>().map(f)
    }

    pub(crate) fn with_mut<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let cell = self.entries.get(&TypeId::of::<T>())?;
        let mut entry = cell.borrow_mut();
        entry.downcast_mut::<T>().map(f)
    }
}

impl fmt::Debug for ContextSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSet")
            .field("len", &self.len())
            .finish()
    }
}

/// Runs `f` against the ambient context of type `T`.
///
/// Returns `None` when called outside a poll, or when the current activity
/// carries no context of that type.
pub fn with_context<T: 'static, R>(f: impl FnOnce(&T) -> R) -> Option<R> {
    crate::activity::with_ambient_contexts(|set| set.with(f)).flatten()
}

/// Runs `f` against the ambient context of type `T`, mutably.
///
/// Only contexts injected by value are mutable; shared handles yield
/// `None` here (use [`with_context`] for those).
pub fn with_context_mut<T: 'static, R>(f: impl FnOnce(&mut T) -> R) -> Option<R> {
    crate::activity::with_ambient_contexts(|set| set.with_mut(f)).flatten()
}

/// Returns true if the current activity carries a context of type `T`.
#[must_use]
pub fn has_context<T: 'static>() -> bool {
    crate::activity::with_ambient_contexts(|set| set.contains::<T>()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_entries_are_mutable() {
        let set = ContextSet::new().with_value(41u32);
        assert_eq!(set.with_mut(|v: &mut u32| std::mem::replace(v, 42)), Some(41));
        assert_eq!(set.with(|v: &u32| *v), Some(42));
    }

    #[test]
    fn shared_entries_are_read_only() {
        let shared = Arc::new(String::from("shared"));
        let set = ContextSet::new().with_shared(Arc::clone(&shared));
        assert_eq!(set.with(|v: &String| v.clone()), Some(String::from("shared")));
        assert_eq!(set.with_mut(|_: &mut String| ()), None);
    }

    #[test]
    fn one_entry_per_type() {
        let set = ContextSet::new().with_value(1u8).with_value(2u8);
        assert_eq!(set.len(), 1);
        assert_eq!(set.with(|v: &u8| *v), Some(2));
    }

    #[test]
    fn accessors_outside_a_poll_are_none() {
        assert_eq!(with_context(|v: &u32| *v), None);
        assert_eq!(with_context_mut(|v: &mut u32| *v), None);
        assert!(!has_context::<u32>());
    }
}

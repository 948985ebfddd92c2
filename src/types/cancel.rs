//! Cancellation reason types.
//!
//! Cancellation is a first-class signal, not a silent drop: every cancelled
//! activity reports *why* it was cancelled through its completion outcome.

use core::fmt;

/// The kind of cancellation an activity observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelKind {
    /// The promise requested its own cancellation during a poll.
    Internal,
    /// The owning pointer was dropped before the promise completed.
    Orphaned,
}

impl fmt::Display for CancelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::Orphaned => write!(f, "orphaned"),
        }
    }
}

/// The reason an activity was cancelled, with optional context.
///
/// Each activity is cancelled at most once (the `done` flag makes any
/// second attempt a no-op), so a reason is constructed exactly once per
/// cancellation and never merged with another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason {
    /// The kind of cancellation.
    pub kind: CancelKind,
    /// Optional human-readable message (static for determinism).
    pub message: Option<&'static str>,
}

impl CancelReason {
    /// Creates a new cancellation reason with the given kind.
    #[must_use]
    pub const fn new(kind: CancelKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates a reason for an activity whose owner dropped it.
    #[must_use]
    pub const fn orphaned() -> Self {
        Self::new(CancelKind::Orphaned)
    }

    /// Creates a reason for a promise that cancelled itself mid-poll.
    #[must_use]
    pub const fn internal() -> Self {
        Self::new(CancelKind::Internal)
    }

    /// Attaches a message to this reason.
    #[must_use]
    pub const fn with_message(mut self, message: &'static str) -> Self {
        self.message = Some(message);
        self
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cancelled ({})", self.kind)?;
        if let Some(message) = self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

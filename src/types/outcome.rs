//! Activity completion outcomes.
//!
//! An [`Outcome`] is the exactly-once value delivered to an activity's
//! completion callback: either the promise's resolved payload (after
//! conversion) or the reason the activity was cancelled first.

use super::cancel::CancelReason;
use core::fmt;

/// The completion value of an activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<S> {
    /// The promise resolved; its payload converted to the completion type.
    Ok(S),
    /// The activity was cancelled before the promise resolved.
    Cancelled(CancelReason),
}

impl<S> Outcome<S> {
    /// Returns true if this outcome is `Ok`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Returns true if this outcome is `Cancelled`.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns the completion value, if any.
    pub fn ok(self) -> Option<S> {
        match self {
            Self::Ok(value) => Some(value),
            Self::Cancelled(_) => None,
        }
    }

    /// Maps the completion value using the provided function.
    pub fn map<U, F: FnOnce(S) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Ok(value) => Outcome::Ok(f(value)),
            Self::Cancelled(reason) => Outcome::Cancelled(reason),
        }
    }

    /// Converts this outcome to a standard `Result`, with cancellation as
    /// the error.
    ///
    /// # Errors
    ///
    /// Returns the [`CancelReason`] if the activity was cancelled.
    pub fn into_result(self) -> Result<S, CancelReason> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Cancelled(reason) => Err(reason),
        }
    }
}

impl<S: fmt::Display> fmt::Display for Outcome<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(value) => write!(f, "ok: {value}"),
            Self::Cancelled(reason) => write!(f, "{reason}"),
        }
    }
}

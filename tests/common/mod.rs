//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use polldrive::Outcome;
use std::sync::{Arc, Mutex};

/// Records every completion delivered to an activity's `on_done`.
pub struct Completions<S> {
    outcomes: Arc<Mutex<Vec<Outcome<S>>>>,
}

impl<S> Completions<S> {
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Produces the `on_done` callback wired to this recorder.
    pub fn recorder(&self) -> impl FnOnce(Outcome<S>) + Send + 'static
    where
        S: Send + 'static,
    {
        let sink = Arc::clone(&self.outcomes);
        move |outcome| sink.lock().unwrap().push(outcome)
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<Outcome<S>> {
        std::mem::take(&mut *self.outcomes.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.outcomes.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S> Clone for Completions<S> {
    fn clone(&self) -> Self {
        Self {
            outcomes: Arc::clone(&self.outcomes),
        }
    }
}

impl<S> Default for Completions<S> {
    fn default() -> Self {
        Self::new()
    }
}

//! Per-call attempt error accumulation.
//!
//! One `AttemptErrors` value lives on the stack of each call through the
//! client. The mutex keeps it safe should an observer ever hand work to a
//! helper task, although the reference flow is single-threaded per call.

use crate::error::Error;
use std::sync::Mutex;

/// Ordered log of the errors a single call's attempts produced.
#[derive(Debug, Default)]
pub struct AttemptErrors {
    errors: Mutex<Vec<Error>>,
}

impl AttemptErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, error: Error) {
        self.errors.lock().unwrap().push(error);
    }

    /// Drop everything recorded so far (a successful attempt absolves the
    /// ones before it).
    pub fn clear(&self) {
        self.errors.lock().unwrap().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().unwrap().is_empty()
    }

    /// Collapse into the surfaced failure: the last error speaks for the
    /// call, the full list stays attached for diagnostics. `None` when no
    /// attempt failed.
    pub fn into_error(self, attempts: usize) -> Option<Error> {
        let errors = self.errors.into_inner().unwrap();
        if errors.is_empty() {
            None
        } else {
            Some(Error::Exhausted { attempts, errors })
        }
    }
}

//! Plugin surface: observers and capability registration.
//!
//! Capabilities are tagged variants, one per kind, so the client keeps a
//! dedicated slot per capability instead of a string-keyed map. Adding a
//! capability means adding a variant; the breaker is untouched.

use crate::error::Error;
use crate::retrier::Retrier;
use http::Extensions;
use reqwest::{Request, Response};
use std::sync::Arc;

/// A capability offered to the client. Loggers accumulate (registration
/// order is invocation order, duplicates fire twice); a retrier replaces
/// the previously resolved one.
pub enum Plugin {
    Logger(Arc<dyn Observer>),
    Retrier(Arc<dyn Retrier>),
}

/// Per-attempt hooks. All three run synchronously on the calling task and
/// must stay off the hot path's critical sections; implementations may
/// stash attempt-scoped metadata in the context's extensions.
pub trait Observer: Send + Sync {
    /// Runs before the attempt is handed to the transport.
    fn on_request_start(&self, request: &Request, context: &mut AttemptContext);

    /// Runs after the transport produced a response, including responses
    /// later classified as server-error failures.
    fn on_request_end(&self, request: &Request, response: &Response, context: &AttemptContext);

    /// Runs after a transport error.
    fn on_request_error(&self, request: &Request, error: &Error, context: &AttemptContext);
}

/// Attempt-scoped state shared down the observer chain.
pub struct AttemptContext {
    attempt: usize,
    extensions: Extensions,
}

impl AttemptContext {
    pub fn new(attempt: usize) -> Self {
        Self { attempt, extensions: Extensions::new() }
    }

    /// 0-based attempt index within the current call.
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// Typed metadata attached by earlier observers.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Marker(u32);

    #[test]
    fn context_carries_typed_metadata() {
        let mut context = AttemptContext::new(2);
        assert_eq!(context.attempt(), 2);
        assert!(context.extensions().get::<Marker>().is_none());

        context.extensions_mut().insert(Marker(7));
        assert_eq!(context.extensions().get::<Marker>(), Some(&Marker(7)));
    }
}

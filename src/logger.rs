//! Built-in logging observer.
//!
//! Stamps the attempt start time into the attempt context and emits one
//! `tracing` event per attempt outcome. Formatting and destination belong
//! to whatever subscriber the application installs.

use crate::error::Error;
use crate::plugin::{AttemptContext, Observer, Plugin};
use reqwest::{Request, Response};
use std::sync::Arc;
use std::time::Instant;

/// Observer that logs every attempt with its wall-clock duration.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

#[derive(Debug, Clone, Copy)]
struct StartedAt(Instant);

impl LogObserver {
    pub fn new() -> Self {
        Self
    }

    /// Package as a logger plugin, ready for
    /// [`Client::add_plugin`](crate::Client::add_plugin).
    pub fn plugin() -> Plugin {
        Plugin::Logger(Arc::new(Self))
    }
}

fn elapsed_millis(context: &AttemptContext) -> u64 {
    context
        .extensions()
        .get::<StartedAt>()
        .map(|started| u64::try_from(started.0.elapsed().as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

impl Observer for LogObserver {
    fn on_request_start(&self, _request: &Request, context: &mut AttemptContext) {
        context.extensions_mut().insert(StartedAt(Instant::now()));
    }

    fn on_request_end(&self, request: &Request, response: &Response, context: &AttemptContext) {
        tracing::info!(
            method = %request.method(),
            url = %request.url(),
            status = response.status().as_u16(),
            attempt = context.attempt(),
            elapsed_ms = elapsed_millis(context),
            "request completed"
        );
    }

    fn on_request_error(&self, request: &Request, error: &Error, context: &AttemptContext) {
        tracing::warn!(
            method = %request.method(),
            url = %request.url(),
            attempt = context.attempt(),
            elapsed_ms = elapsed_millis(context),
            error = %error,
            "request failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_hook_stamps_the_attempt_context() {
        let url = reqwest::Url::parse("http://service.test/resource").unwrap();
        let request = Request::new(reqwest::Method::GET, url);
        let mut context = AttemptContext::new(0);

        assert_eq!(elapsed_millis(&context), 0, "no stamp before the start hook");
        LogObserver::new().on_request_start(&request, &mut context);
        assert!(context.extensions().get::<StartedAt>().is_some());
    }

    #[test]
    fn plugin_carries_the_logger_capability() {
        assert!(matches!(LogObserver::plugin(), Plugin::Logger(_)));
    }
}

//! Retry-interval policies.
//!
//! A [`Retrier`] answers one question: how long to wait before retry
//! `attempt` (0-based). The client starts with [`NoRetrier`] and swaps in
//! whatever retrier plugin is registered.

use crate::backoff::Backoff;
use crate::plugin::Plugin;
use std::sync::Arc;
use std::time::Duration;

/// Wait policy consulted between attempts of a single call.
pub trait Retrier: Send + Sync {
    /// Wait duration before retry `attempt`; `0` is the first retry.
    fn next_interval(&self, attempt: usize) -> Duration;
}

/// The default: never wait (and, combined with `retry_count = 0`, never
/// retry).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetrier;

impl Retrier for NoRetrier {
    fn next_interval(&self, _attempt: usize) -> Duration {
        Duration::ZERO
    }
}

/// Retrier driven by a [`Backoff`] strategy.
#[derive(Debug, Clone)]
pub struct BackoffRetrier {
    backoff: Backoff,
}

impl BackoffRetrier {
    pub fn new(backoff: Backoff) -> Self {
        Self { backoff }
    }

    /// Package a backoff as a retrier plugin, ready for
    /// [`Client::add_plugin`](crate::Client::add_plugin).
    pub fn plugin(backoff: Backoff) -> Plugin {
        Plugin::Retrier(Arc::new(Self::new(backoff)))
    }
}

impl Retrier for BackoffRetrier {
    fn next_interval(&self, attempt: usize) -> Duration {
        self.backoff.next(attempt)
    }
}

/// Closure adapter for ad-hoc retry intervals.
pub struct RetrierFn<F>(F);

impl<F> RetrierFn<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Retrier for RetrierFn<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn next_interval(&self, attempt: usize) -> Duration {
        (self.0)(attempt)
    }
}

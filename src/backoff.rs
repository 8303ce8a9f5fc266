//! Backoff strategies for the retry loop.
//!
//! A backoff maps a retry index to a wait duration. Attempt `0` is the
//! first retry, i.e. the pause taken after the initial attempt failed.
//! Jitter is an absolute bound: the computed delay is shifted by a uniform
//! offset in `[-jitter, +jitter]`, floored at zero.
//!
//! ```rust
//! use std::time::Duration;
//! use rampart::Backoff;
//!
//! let backoff = Backoff::exponential(
//!     Duration::from_millis(100),
//!     2.0,
//!     Duration::from_secs(2),
//! );
//! assert_eq!(backoff.next(0), Duration::from_millis(100));
//! assert_eq!(backoff.next(1), Duration::from_millis(200));
//! assert_eq!(backoff.next(10), Duration::from_secs(2)); // capped
//! ```
//!
//! Overflow behavior: computations saturate at [`MAX_BACKOFF`] (1 day)
//! rather than panicking.

use rand::{rng, Rng};
use std::time::Duration;

/// Ceiling applied when a delay computation overflows or has no cap.
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Wait-duration policy for retries.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Fixed delay, optionally jittered.
    Constant { base: Duration, jitter: Duration },
    /// `min(cap, base * factor^attempt)`, optionally jittered.
    Exponential {
        base: Duration,
        factor: f64,
        cap: Duration,
        jitter: Duration,
    },
}

impl Backoff {
    /// Constant backoff with no jitter.
    pub fn constant(base: Duration) -> Self {
        Backoff::Constant { base, jitter: Duration::ZERO }
    }

    /// Exponential backoff with no jitter. `factor` is the per-retry
    /// multiplier; `cap` bounds the computed delay.
    pub fn exponential(base: Duration, factor: f64, cap: Duration) -> Self {
        Backoff::Exponential { base, factor, cap, jitter: Duration::ZERO }
    }

    /// Set the maximum absolute jitter added to or subtracted from each
    /// delay.
    pub fn with_jitter(mut self, amount: Duration) -> Self {
        match &mut self {
            Backoff::Constant { jitter, .. } | Backoff::Exponential { jitter, .. } => {
                *jitter = amount;
            }
        }
        self
    }

    /// Delay before retry `attempt` (0-based), jittered with the thread RNG.
    pub fn next(&self, attempt: usize) -> Duration {
        self.next_with_rng(attempt, &mut rng())
    }

    /// Delay before retry `attempt`, jittered with the supplied RNG.
    /// Deterministic given the backoff parameters and the RNG state.
    pub fn next_with_rng<R: Rng>(&self, attempt: usize, rng: &mut R) -> Duration {
        let (raw, jitter) = match self {
            Backoff::Constant { base, jitter } => (*base, *jitter),
            Backoff::Exponential { base, factor, cap, jitter } => {
                (exponential_delay(*base, *factor, *cap, attempt), *jitter)
            }
        };
        apply_jitter(raw, jitter, rng)
    }
}

fn exponential_delay(base: Duration, factor: f64, cap: Duration, attempt: usize) -> Duration {
    let cap = cap.min(MAX_BACKOFF);
    let exponent = attempt.min(i32::MAX as usize) as i32;
    let nanos = base.as_nanos() as f64 * factor.powi(exponent);
    if !nanos.is_finite() || nanos >= cap.as_nanos() as f64 {
        return cap;
    }
    Duration::from_nanos(nanos as u64).min(cap)
}

fn apply_jitter<R: Rng>(delay: Duration, jitter: Duration, rng: &mut R) -> Duration {
    let jitter_millis = as_millis_saturated(jitter);
    if jitter_millis == 0 {
        return delay;
    }
    let delay_millis = as_millis_saturated(delay);
    // Uniform offset in [-jitter, +jitter], floored at zero.
    let offset = rng.random_range(0..=jitter_millis.saturating_mul(2));
    Duration::from_millis(delay_millis.saturating_add(offset).saturating_sub(jitter_millis))
}

fn as_millis_saturated(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

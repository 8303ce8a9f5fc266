//! Three-state, generation-counted circuit breaker.
//!
//! The breaker gates an async operation: `Closed` lets everything through
//! and watches failures, `Open` rejects without dispatching, and `HalfOpen`
//! admits a bounded number of trial requests after the open cooldown.
//! Every state change (and every closed-phase bucket rollover) bumps a
//! generation counter; an in-flight operation whose generation no longer
//! matches at release is discarded, so a slow pre-open request can never
//! trip or untrip the phase that replaced it.
//!
//! A single mutex guards the mutable state. The operation future itself
//! runs without the lock; only the acquire/release bookkeeping holds it.
//! State-change callbacks fire after the lock is released, so they may
//! re-enter the breaker freely.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_TRIP_THRESHOLD: u32 = 5;

/// Breaker phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    HalfOpen,
    Open,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Closed => write!(f, "closed"),
            State::HalfOpen => write!(f, "half-open"),
            State::Open => write!(f, "open"),
        }
    }
}

/// Counters for the current generation. Cleared on every state change and
/// on every closed-phase bucket rollover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn record_success(&mut self) {
        self.total_successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    fn record_failure(&mut self) {
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }
}

/// Predicate deciding when a closed breaker should trip.
pub type ReadyToTrip = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;

/// Hook invoked on every state change, with `(name, from, to)`.
pub type StateChangeHook = Arc<dyn Fn(&str, State, State) + Send + Sync>;

/// Breaker configuration. Immutable after construction.
#[derive(Clone, Default)]
pub struct BreakerConfig {
    /// Informational name, included in logs and callbacks.
    pub name: String,
    /// Cap on concurrent trial requests while half-open. Zero means one.
    pub max_half_open_requests: u32,
    /// Closed-phase bucket window; counters reset every `interval` while
    /// closed. Zero disables bucketing.
    pub interval: Duration,
    /// How long the breaker stays open before probing. Zero means 60 s.
    pub open_timeout: Duration,
    /// Trip predicate evaluated on each closed-phase failure. Defaults to
    /// more than five consecutive failures.
    pub ready_to_trip: Option<ReadyToTrip>,
    /// Optional state-change hook.
    pub on_state_change: Option<StateChangeHook>,
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The breaker is open; the operation did not run.
    Open,
    /// The breaker is half-open and its trial quota is taken; the
    /// operation did not run.
    TooManyRequests,
    /// The operation ran and failed.
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open)
    }

    pub fn is_too_many_requests(&self) -> bool {
        matches!(self, BreakerError::TooManyRequests)
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open => write!(f, "circuit breaker is open"),
            BreakerError::TooManyRequests => {
                write!(f, "too many requests in half-open state")
            }
            BreakerError::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Monotone millisecond reading used for deadline checks. A closure rather
/// than a fixed timer so tests can steer deadlines directly.
type TimeSource = Arc<dyn Fn() -> u64 + Send + Sync>;

struct Shared {
    state: State,
    generation: u64,
    counts: Counts,
    /// End of the current closed-phase bucket or open-phase cooldown, in
    /// time-source milliseconds. `None` when no deadline applies.
    expiry: Option<u64>,
}

struct Inner {
    name: String,
    max_half_open_requests: u32,
    interval_millis: u64,
    open_timeout_millis: u64,
    ready_to_trip: ReadyToTrip,
    on_state_change: Option<StateChangeHook>,
    time: TimeSource,
    shared: Mutex<Shared>,
}

/// Generation-counted three-state gate. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

enum Rejection {
    Open,
    TooManyRequests,
}

impl Rejection {
    fn gate<E>(self) -> BreakerError<E> {
        match self {
            Rejection::Open => BreakerError::Open,
            Rejection::TooManyRequests => BreakerError::TooManyRequests,
        }
    }
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        let start = Instant::now();
        Self::build(
            config,
            Arc::new(move || u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)),
        )
    }

    /// Swap the millisecond time source, restarting the breaker closed on
    /// the new timeline. Readings must never decrease.
    pub fn with_time_source<F>(self, time: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        let inner = &self.inner;
        Self::build(
            BreakerConfig {
                name: inner.name.clone(),
                max_half_open_requests: inner.max_half_open_requests,
                interval: Duration::from_millis(inner.interval_millis),
                open_timeout: Duration::from_millis(inner.open_timeout_millis),
                ready_to_trip: Some(inner.ready_to_trip.clone()),
                on_state_change: inner.on_state_change.clone(),
            },
            Arc::new(time),
        )
    }

    fn build(config: BreakerConfig, time: TimeSource) -> Self {
        let interval_millis = as_millis_saturated(config.interval);
        let open_timeout = if config.open_timeout.is_zero() {
            DEFAULT_OPEN_TIMEOUT
        } else {
            config.open_timeout
        };
        let now = time();
        let shared = Shared {
            state: State::Closed,
            generation: 0,
            counts: Counts::default(),
            expiry: (interval_millis > 0).then(|| now.saturating_add(interval_millis)),
        };
        Self {
            inner: Arc::new(Inner {
                name: config.name,
                max_half_open_requests: config.max_half_open_requests.max(1),
                interval_millis,
                open_timeout_millis: as_millis_saturated(open_timeout),
                ready_to_trip: config
                    .ready_to_trip
                    .unwrap_or_else(|| {
                        Arc::new(|counts| counts.consecutive_failures > DEFAULT_TRIP_THRESHOLD)
                    }),
                on_state_change: config.on_state_change,
                time,
                shared: Mutex::new(shared),
            }),
        }
    }

    /// Informational name given at construction.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Run `operation` through the gate. The whole operation counts as one
    /// success or failure event, whatever it does internally.
    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, BreakerError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        Op: FnOnce() -> Fut,
    {
        let generation = match self.before_request() {
            Ok(generation) => generation,
            Err(rejection) => return Err(rejection.gate()),
        };
        let result = operation().await;
        self.after_request(generation, result.is_ok());
        result.map_err(BreakerError::Inner)
    }

    /// Current phase, after rolling expired deadlines forward.
    pub fn current_state(&self) -> State {
        let (state, transition) = {
            let mut shared = self.inner.shared.lock().unwrap();
            let now = (self.inner.time)();
            let transition = self.roll(&mut shared, now);
            (shared.state, transition)
        };
        self.notify(transition);
        state
    }

    pub fn is_open(&self) -> bool {
        self.current_state() == State::Open
    }

    /// Snapshot of the current generation's counters.
    pub fn counts(&self) -> Counts {
        self.inner.shared.lock().unwrap().counts
    }

    fn before_request(&self) -> Result<u64, Rejection> {
        let (outcome, transition) = {
            let mut shared = self.inner.shared.lock().unwrap();
            let now = (self.inner.time)();
            let transition = self.roll(&mut shared, now);
            let outcome = match shared.state {
                State::Open => Err(Rejection::Open),
                State::HalfOpen
                    if shared.counts.requests >= self.inner.max_half_open_requests =>
                {
                    Err(Rejection::TooManyRequests)
                }
                _ => {
                    shared.counts.requests += 1;
                    Ok(shared.generation)
                }
            };
            (outcome, transition)
        };
        self.notify(transition);
        outcome
    }

    fn after_request(&self, generation: u64, success: bool) {
        let (roll_transition, update_transition) = {
            let mut shared = self.inner.shared.lock().unwrap();
            let now = (self.inner.time)();
            let roll_transition = self.roll(&mut shared, now);
            // A generation mismatch means the phase changed while the
            // operation was in flight; its outcome no longer speaks for
            // the current generation.
            let update_transition = if shared.generation != generation {
                None
            } else if success {
                self.on_success(&mut shared, now)
            } else {
                self.on_failure(&mut shared, now)
            };
            (roll_transition, update_transition)
        };
        self.notify(roll_transition);
        self.notify(update_transition);
    }

    /// Advance expired deadlines: closed buckets start a new generation,
    /// an elapsed open cooldown moves to half-open.
    fn roll(&self, shared: &mut Shared, now: u64) -> Option<(State, State)> {
        match shared.state {
            State::Closed => {
                if shared.expiry.is_some_and(|expiry| now >= expiry) {
                    self.new_generation(shared, now);
                }
                None
            }
            State::Open => {
                if shared.expiry.is_some_and(|expiry| now >= expiry) {
                    Some(self.set_state(shared, State::HalfOpen, now))
                } else {
                    None
                }
            }
            State::HalfOpen => None,
        }
    }

    fn on_success(&self, shared: &mut Shared, now: u64) -> Option<(State, State)> {
        shared.counts.record_success();
        match shared.state {
            State::HalfOpen
                if shared.counts.consecutive_successes >= self.inner.max_half_open_requests =>
            {
                Some(self.set_state(shared, State::Closed, now))
            }
            _ => None,
        }
    }

    fn on_failure(&self, shared: &mut Shared, now: u64) -> Option<(State, State)> {
        match shared.state {
            State::Closed => {
                shared.counts.record_failure();
                if (self.inner.ready_to_trip)(&shared.counts) {
                    Some(self.set_state(shared, State::Open, now))
                } else {
                    None
                }
            }
            State::HalfOpen => {
                shared.counts.record_failure();
                Some(self.set_state(shared, State::Open, now))
            }
            State::Open => None,
        }
    }

    fn set_state(&self, shared: &mut Shared, to: State, now: u64) -> (State, State) {
        let from = shared.state;
        shared.state = to;
        self.new_generation(shared, now);
        (from, to)
    }

    fn new_generation(&self, shared: &mut Shared, now: u64) {
        shared.generation += 1;
        shared.counts = Counts::default();
        shared.expiry = match shared.state {
            State::Closed => (self.inner.interval_millis > 0)
                .then(|| now.saturating_add(self.inner.interval_millis)),
            State::Open => Some(now.saturating_add(self.inner.open_timeout_millis)),
            State::HalfOpen => None,
        };
    }

    fn notify(&self, transition: Option<(State, State)>) {
        let Some((from, to)) = transition else { return };
        match to {
            State::Open => tracing::warn!(
                breaker = %self.inner.name, %from, %to, "circuit breaker opened"
            ),
            State::HalfOpen => tracing::info!(
                breaker = %self.inner.name, %from, %to, "circuit breaker probing"
            ),
            State::Closed => tracing::info!(
                breaker = %self.inner.name, %from, %to, "circuit breaker closed"
            ),
        }
        if let Some(hook) = &self.inner.on_state_change {
            hook(&self.inner.name, from, to);
        }
    }
}

fn as_millis_saturated(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

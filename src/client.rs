//! Client façade: composes breaker, retrier, observers, and fallback
//! around a transport.
//!
//! One call through [`Client::execute`] is one breaker event, however many
//! attempts the retry loop makes underneath it. The method helpers
//! (`get`, `post`, ...) build the request themselves and take exactly one
//! attempt through the breaker.

use crate::attempts::AttemptErrors;
use crate::breaker::{BreakerConfig, BreakerError, CircuitBreaker, Counts, State};
use crate::error::{BoxError, Error};
use crate::plugin::{AttemptContext, Observer, Plugin};
use crate::retrier::{NoRetrier, Retrier};
use crate::transport::{HttpTransport, Transport};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use reqwest::{Method, Request, Response, Url};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::options::RequestOption;

const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SERVER_ERROR_THRESHOLD: u16 = 500;

/// Client construction parameters. Zero durations select the documented
/// defaults.
#[derive(Clone, Default)]
pub struct Config {
    /// Breaker name, informational.
    pub name: String,
    /// Prefix concatenated verbatim with the path given to the method
    /// helpers.
    pub base_url: String,
    /// Per-request transport timeout. Zero means 30 s.
    pub transport_timeout: Duration,
    /// Half-open trial-request cap. Zero means one.
    pub max_half_open_requests: u32,
    /// Closed-phase counter bucket window. Zero disables bucketing.
    pub interval: Duration,
    /// Open-phase dwell before probing. Zero means 60 s.
    pub open_timeout: Duration,
    /// Trip predicate; defaults to more than five consecutive failures.
    pub ready_to_trip: Option<crate::breaker::ReadyToTrip>,
    /// Breaker state-change hook.
    pub on_state_change: Option<crate::breaker::StateChangeHook>,
    /// Treat responses at or above `server_error_threshold` as failures
    /// (and feed them into the retry loop).
    pub consider_server_error_as_failure: bool,
    /// Status threshold for the above. Zero means 500.
    pub server_error_threshold: u16,
    /// Number of retries after the first attempt; a call makes at most
    /// `retry_count + 1` attempts.
    pub retry_count: usize,
}

/// Consulted when the breaker surfaces an error for a call.
#[async_trait]
pub trait Fallback: Send + Sync {
    /// `Ok(Some(response))` answers the call with that response;
    /// `Ok(None)` lets the original error through; `Err` replaces it with
    /// a fallback error.
    async fn recover(&self) -> Result<Option<Response>, BoxError>;
}

/// Closure adapter for simple fallbacks.
pub struct FallbackFn<F>(F);

impl<F> FallbackFn<F>
where
    F: Fn() -> Result<Option<Response>, BoxError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Fallback for FallbackFn<F>
where
    F: Fn() -> Result<Option<Response>, BoxError> + Send + Sync,
{
    async fn recover(&self) -> Result<Option<Response>, BoxError> {
        (self.0)()
    }
}

/// The retrier resolved at plugin-registration time; swapped atomically so
/// the hot path never rescans the plugin set.
struct ResolvedRetrier {
    retrier: Arc<dyn Retrier>,
}

/// How the client waits out a backoff interval. The returned future is
/// awaited inside the call, so dropping the call abandons the wait too.
type Pause = Arc<dyn Fn(Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

fn timer_pause(interval: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(tokio::time::sleep(interval))
}

/// Resilient HTTP client.
pub struct Client {
    transport: Arc<dyn Transport>,
    breaker: CircuitBreaker,
    pause: Pause,
    base_url: String,
    consider_server_error_as_failure: bool,
    server_error_threshold: u16,
    retry_count: usize,
    observers: RwLock<Vec<Arc<dyn Observer>>>,
    retrier: ArcSwap<ResolvedRetrier>,
    fallback: RwLock<Option<Arc<dyn Fallback>>>,
}

impl Client {
    /// Build a client over the production transport.
    pub fn new(config: Config) -> Result<Self, Error> {
        let timeout = if config.transport_timeout.is_zero() {
            DEFAULT_TRANSPORT_TIMEOUT
        } else {
            config.transport_timeout
        };
        let transport = HttpTransport::new(timeout)?;
        Ok(Self::assemble(config, Arc::new(transport)))
    }

    /// Replace the transport (tests, alternative stacks).
    pub fn with_transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Replace how backoff intervals are waited out. Tests use this to
    /// record the requested intervals instead of sleeping through them.
    pub fn with_pause<F, Fut>(mut self, pause: F) -> Self
    where
        F: Fn(Duration) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.pause = Arc::new(move |interval| Box::pin(pause(interval)));
        self
    }

    fn assemble(config: Config, transport: Arc<dyn Transport>) -> Self {
        let threshold = if config.server_error_threshold == 0 {
            DEFAULT_SERVER_ERROR_THRESHOLD
        } else {
            config.server_error_threshold
        };
        let breaker = CircuitBreaker::new(BreakerConfig {
            name: config.name,
            max_half_open_requests: config.max_half_open_requests,
            interval: config.interval,
            open_timeout: config.open_timeout,
            ready_to_trip: config.ready_to_trip,
            on_state_change: config.on_state_change,
        });
        Self {
            transport,
            breaker,
            pause: Arc::new(timer_pause),
            base_url: config.base_url,
            consider_server_error_as_failure: config.consider_server_error_as_failure,
            server_error_threshold: threshold,
            retry_count: config.retry_count,
            observers: RwLock::new(Vec::new()),
            retrier: ArcSwap::from_pointee(ResolvedRetrier { retrier: Arc::new(NoRetrier) }),
            fallback: RwLock::new(None),
        }
    }

    /// The breaker guarding this client, for observation.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Breaker phase snapshot.
    pub fn breaker_state(&self) -> State {
        self.breaker.current_state()
    }

    /// Breaker counter snapshot.
    pub fn breaker_counts(&self) -> Counts {
        self.breaker.counts()
    }

    /// Register a plugin. Loggers accumulate in registration order; a
    /// retrier plugin replaces the resolved retrier for subsequent calls.
    pub fn add_plugin(&self, plugin: Plugin) {
        match plugin {
            Plugin::Logger(observer) => {
                self.observers.write().unwrap().push(observer);
            }
            Plugin::Retrier(retrier) => {
                self.retrier.store(Arc::new(ResolvedRetrier { retrier }));
            }
        }
    }

    /// Install the fallback consulted when the breaker surfaces an error.
    pub fn set_fallback<F: Fallback + 'static>(&self, fallback: F) {
        *self.fallback.write().unwrap() = Some(Arc::new(fallback));
    }

    pub async fn get(
        &self,
        path: &str,
        options: Vec<RequestOption>,
    ) -> Result<Response, Error> {
        self.request(Method::GET, path, options).await
    }

    pub async fn post(
        &self,
        path: &str,
        options: Vec<RequestOption>,
    ) -> Result<Response, Error> {
        self.request(Method::POST, path, options).await
    }

    pub async fn put(
        &self,
        path: &str,
        options: Vec<RequestOption>,
    ) -> Result<Response, Error> {
        self.request(Method::PUT, path, options).await
    }

    pub async fn patch(
        &self,
        path: &str,
        options: Vec<RequestOption>,
    ) -> Result<Response, Error> {
        self.request(Method::PATCH, path, options).await
    }

    pub async fn delete(
        &self,
        path: &str,
        options: Vec<RequestOption>,
    ) -> Result<Response, Error> {
        self.request(Method::DELETE, path, options).await
    }

    /// Build a request from `base_url + path`, apply the options in order,
    /// and take a single attempt through the breaker. Helpers never retry;
    /// retry applies only to [`execute`](Self::execute).
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: Vec<RequestOption>,
    ) -> Result<Response, Error> {
        let mut request = self.build_request(method, path)?;
        for option in options {
            option
                .apply(&mut request)
                .map_err(|source| Error::OptionApply { source })?;
        }
        let result = self.breaker.execute(|| self.single_attempt(&request)).await;
        self.conclude(result).await
    }

    /// Dispatch an externally constructed request with retries. The whole
    /// call is one breaker event: an eventual success counts as one
    /// success, exhausting every attempt counts as one failure.
    pub async fn execute(&self, request: Request) -> Result<Response, Error> {
        let resolved = self.retrier.load_full();
        ensure_replayable(&request)?;
        let result = self
            .breaker
            .execute(|| self.run_attempts(&request, resolved.retrier.as_ref()))
            .await;
        self.conclude(result).await
    }

    fn build_request(&self, method: Method, path: &str) -> Result<Request, Error> {
        let raw = format!("{}{}", self.base_url, path);
        let url = Url::parse(&raw).map_err(|source| Error::InvalidUrl { url: raw, source })?;
        Ok(Request::new(method, url))
    }

    async fn run_attempts(
        &self,
        request: &Request,
        retrier: &dyn Retrier,
    ) -> Result<Response, Error> {
        if self.breaker.is_open() {
            return Err(Error::CircuitOpen);
        }
        let errors = AttemptErrors::new();
        for attempt in 0..=self.retry_count {
            let mut context = AttemptContext::new(attempt);
            self.notify_start(request, &mut context);
            let dispatch = replay(request)?;
            match self.transport.send(dispatch).await {
                Err(error) => {
                    self.notify_error(request, &error, &context);
                    errors.push(error);
                }
                Ok(response) => {
                    self.notify_end(request, &response, &context);
                    if self.is_server_error(&response) {
                        errors.push(Error::ServerStatus { status: response.status() });
                    } else {
                        errors.clear();
                        return Ok(response);
                    }
                }
            }
            if attempt < self.retry_count {
                (self.pause)(retrier.next_interval(attempt)).await;
            }
        }
        match errors.into_error(self.retry_count + 1) {
            Some(error) => Err(error),
            None => unreachable!("every failed attempt records an error"),
        }
    }

    async fn single_attempt(&self, request: &Request) -> Result<Response, Error> {
        let mut context = AttemptContext::new(0);
        self.notify_start(request, &mut context);
        let dispatch = replay(request)?;
        match self.transport.send(dispatch).await {
            Err(error) => {
                self.notify_error(request, &error, &context);
                Err(error)
            }
            Ok(response) => {
                self.notify_end(request, &response, &context);
                if self.is_server_error(&response) {
                    Err(Error::ServerStatus { status: response.status() })
                } else {
                    Ok(response)
                }
            }
        }
    }

    /// Map the breaker outcome to the caller's result, consulting the
    /// fallback exactly once when the breaker surfaced an error.
    async fn conclude(
        &self,
        result: Result<Response, BreakerError<Error>>,
    ) -> Result<Response, Error> {
        let original = match result {
            Ok(response) => return Ok(response),
            Err(BreakerError::Open) => Error::CircuitOpen,
            Err(BreakerError::TooManyRequests) => Error::TooManyRequests,
            Err(BreakerError::Inner(error)) => error,
        };
        let fallback = self.fallback.read().unwrap().clone();
        let Some(fallback) = fallback else {
            return Err(original);
        };
        tracing::debug!(error = %original, "consulting fallback");
        match fallback.recover().await {
            Err(source) => Err(Error::Fallback { source }),
            Ok(None) => Err(original),
            Ok(Some(response)) => Ok(response),
        }
    }

    fn is_server_error(&self, response: &Response) -> bool {
        self.consider_server_error_as_failure
            && response.status().as_u16() >= self.server_error_threshold
    }

    fn observers(&self) -> Vec<Arc<dyn Observer>> {
        self.observers.read().unwrap().clone()
    }

    fn notify_start(&self, request: &Request, context: &mut AttemptContext) {
        for observer in self.observers() {
            observer.on_request_start(request, context);
        }
    }

    fn notify_end(&self, request: &Request, response: &Response, context: &AttemptContext) {
        for observer in self.observers() {
            observer.on_request_end(request, response, context);
        }
    }

    fn notify_error(&self, request: &Request, error: &Error, context: &AttemptContext) {
        for observer in self.observers() {
            observer.on_request_error(request, error, context);
        }
    }
}

/// Reject requests whose body cannot be buffered for replay before any
/// attempt is made; nothing has touched the breaker at this point.
fn ensure_replayable(request: &Request) -> Result<(), Error> {
    if request.body().is_some() && request.try_clone().is_none() {
        return Err(Error::BodyCapture {
            reason: "request body is a stream and cannot be replayed".into(),
        });
    }
    Ok(())
}

/// Fresh copy of the captured request for one attempt; the buffered body
/// is rewound to offset zero by construction.
fn replay(request: &Request) -> Result<Request, Error> {
    request.try_clone().ok_or_else(|| Error::BodyCapture {
        reason: "request body is a stream and cannot be replayed".into(),
    })
}

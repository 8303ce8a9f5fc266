#![forbid(unsafe_code)]

//! # Rampart
//!
//! A resilient outbound HTTP client: a thin façade over a standard
//! transport that composes three interlocking primitives.
//!
//! - **Circuit breaker** — three-state, generation-counted gate that
//!   bounds failure amplification toward an unhealthy upstream.
//! - **Retry** — pluggable backoff between attempts, with request-body
//!   replay; an entire call is a single breaker event.
//! - **Fallback** — consulted exactly once when the breaker gives up.
//!
//! Observers hook every attempt for logging and measurement; capabilities
//! are registered as tagged plugins.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use rampart::{Backoff, BackoffRetrier, Client, Config, LogObserver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rampart::Error> {
//!     let client = Client::new(Config {
//!         name: "orders".into(),
//!         base_url: "https://orders.internal".into(),
//!         consider_server_error_as_failure: true,
//!         server_error_threshold: 500,
//!         retry_count: 2,
//!         ..Config::default()
//!     })?;
//!
//!     client.add_plugin(LogObserver::plugin());
//!     client.add_plugin(BackoffRetrier::plugin(
//!         Backoff::exponential(Duration::from_millis(100), 2.0, Duration::from_secs(2))
//!             .with_jitter(Duration::from_millis(20)),
//!     ));
//!
//!     let response = client.get("/orders/42", Vec::new()).await?;
//!     println!("{}", response.status());
//!     Ok(())
//! }
//! ```

pub mod attempts;
pub mod backoff;
pub mod breaker;
pub mod client;
pub mod error;
pub mod logger;
pub mod options;
pub mod plugin;
pub mod retrier;
pub mod transport;

// The client speaks reqwest's HTTP vocabulary; re-export the common types.
pub use reqwest::{Method, Request, Response, StatusCode, Url};

pub use attempts::AttemptErrors;
pub use backoff::{Backoff, MAX_BACKOFF};
pub use breaker::{BreakerConfig, BreakerError, CircuitBreaker, Counts, State};
pub use client::{Client, Config, Fallback, FallbackFn};
pub use error::{BoxError, Error};
pub use logger::LogObserver;
pub use options::{
    body_json, form_data, with_basic_auth, with_bearer_token, with_headers, RequestOption,
};
pub use plugin::{AttemptContext, Observer, Plugin};
pub use retrier::{BackoffRetrier, NoRetrier, Retrier, RetrierFn};
pub use transport::{HttpTransport, Transport};

//! Errors surfaced at the client boundary.

use reqwest::StatusCode;
use std::fmt;

/// Boxed error used for causes coming from transports, request options,
/// and fallbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Everything a call through the client can fail with.
#[derive(Debug)]
pub enum Error {
    /// The circuit breaker is open; the request was not dispatched.
    CircuitOpen,
    /// The breaker is half-open and its trial-request quota is taken.
    TooManyRequests,
    /// The transport failed to produce a response.
    Transport { source: BoxError },
    /// The response status met the configured server-error threshold.
    ServerStatus { status: StatusCode },
    /// The request body could not be captured for replay.
    BodyCapture { reason: String },
    /// A request option returned an error while being applied.
    OptionApply { source: BoxError },
    /// The assembled request URL did not parse.
    InvalidUrl { url: String, source: url::ParseError },
    /// The fallback itself failed.
    Fallback { source: BoxError },
    /// Every attempt of a call failed; the last error is surfaced and the
    /// whole attempt log is retained for diagnostics.
    Exhausted { attempts: usize, errors: Vec<Error> },
}

impl Error {
    /// Wrap a transport-level cause.
    pub fn transport<E: Into<BoxError>>(source: E) -> Self {
        Error::Transport { source: source.into() }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Error::CircuitOpen)
    }

    pub fn is_too_many_requests(&self) -> bool {
        matches!(self, Error::TooManyRequests)
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    pub fn is_server_status(&self) -> bool {
        matches!(self, Error::ServerStatus { .. })
    }

    pub fn is_body_capture(&self) -> bool {
        matches!(self, Error::BodyCapture { .. })
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Error::Fallback { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Error::Exhausted { .. })
    }

    /// The offending status code, if this is a server-status failure.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::ServerStatus { status } => Some(*status),
            _ => None,
        }
    }

    /// The per-attempt error log, if this call exhausted its attempts.
    pub fn attempt_errors(&self) -> Option<&[Error]> {
        match self {
            Error::Exhausted { errors, .. } => Some(errors.as_slice()),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CircuitOpen => write!(f, "circuit breaker is open"),
            Error::TooManyRequests => {
                write!(f, "too many requests in half-open state")
            }
            Error::Transport { source } => write!(f, "request failed: {}", source),
            Error::ServerStatus { status } => {
                write!(f, "server error: {}", status.as_u16())
            }
            Error::BodyCapture { reason } => {
                write!(f, "failed to capture request body: {}", reason)
            }
            Error::OptionApply { source } => {
                write!(f, "failed to apply request option: {}", source)
            }
            Error::InvalidUrl { url, source } => {
                write!(f, "invalid request url {:?}: {}", url, source)
            }
            Error::Fallback { source } => write!(f, "fallback failed: {}", source),
            Error::Exhausted { attempts, errors } => match errors.last() {
                Some(last) => write!(
                    f,
                    "all {} attempts failed; last error: {}",
                    attempts, last
                ),
                None => write!(f, "all {} attempts failed", attempts),
            },
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport { source }
            | Error::OptionApply { source }
            | Error::Fallback { source } => Some(&**source),
            Error::InvalidUrl { source, .. } => Some(source),
            Error::Exhausted { errors, .. } => {
                errors.last().map(|e| e as &dyn std::error::Error)
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(source: reqwest::Error) -> Self {
        Error::transport(source)
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use rampart::{AttemptContext, Client, Config, Error, Observer, Response, Transport};
use reqwest::{Method, Request, Url};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted transport outcome.
pub enum Step {
    /// Fail with a connection-level error.
    Fail(&'static str),
    /// Respond with the given status.
    Respond(u16),
    /// Sleep, then respond with the given status.
    RespondSlowly(Duration, u16),
}

#[derive(Default)]
struct MockInner {
    script: Mutex<VecDeque<Step>>,
    bodies: Mutex<Vec<Option<Vec<u8>>>>,
    dispatches: AtomicUsize,
}

/// Transport that replays a script of outcomes and records what it saw.
/// Clones share state, so tests can keep a handle for assertions.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl MockTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        let transport = Self::default();
        *transport.inner.script.lock().unwrap() = steps.into();
        transport
    }

    /// Number of attempts that reached the transport.
    pub fn dispatches(&self) -> usize {
        self.inner.dispatches.load(Ordering::SeqCst)
    }

    /// Request body bytes observed per attempt, in order.
    pub fn bodies(&self) -> Vec<Option<Vec<u8>>> {
        self.inner.bodies.lock().unwrap().clone()
    }
}

pub fn response_with_status(status: u16) -> Response {
    Response::from(
        http::Response::builder()
            .status(status)
            .body(String::new())
            .expect("static response must build"),
    )
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response, Error> {
        self.inner.dispatches.fetch_add(1, Ordering::SeqCst);
        self.inner.bodies.lock().unwrap().push(
            request
                .body()
                .and_then(|body| body.as_bytes())
                .map(|bytes| bytes.to_vec()),
        );
        let step = self
            .inner
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Respond(200));
        match step {
            Step::Fail(message) => Err(Error::transport(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                message,
            ))),
            Step::Respond(status) => Ok(response_with_status(status)),
            Step::RespondSlowly(delay, status) => {
                tokio::time::sleep(delay).await;
                Ok(response_with_status(status))
            }
        }
    }
}

/// Observer that appends labeled events to a (possibly shared) log.
#[derive(Clone)]
pub struct RecordingObserver {
    label: &'static str,
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingObserver {
    pub fn new(label: &'static str) -> Self {
        Self::with_log(label, Arc::new(Mutex::new(Vec::new())))
    }

    /// Share one event log between several observers to assert ordering.
    pub fn with_log(label: &'static str, events: Arc<Mutex<Vec<String>>>) -> Self {
        Self { label, events }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl Observer for RecordingObserver {
    fn on_request_start(&self, _request: &Request, context: &mut AttemptContext) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{}:start:{}", self.label, context.attempt()));
    }

    fn on_request_end(&self, _request: &Request, response: &Response, _context: &AttemptContext) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{}:end:{}", self.label, response.status().as_u16()));
    }

    fn on_request_error(&self, _request: &Request, _error: &Error, _context: &AttemptContext) {
        self.events.lock().unwrap().push(format!("{}:error", self.label));
    }
}

pub fn client_with(config: Config, transport: MockTransport) -> Client {
    Client::new(config)
        .expect("client must build")
        .with_transport(transport)
}

pub fn get_request(url: &str) -> Request {
    Request::new(Method::GET, Url::parse(url).expect("test url must parse"))
}

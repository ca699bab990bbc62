//! Per-request and per-response context handles.
//!
//! Both contexts are cheap handles around shared state. Hooks receive their
//! own clones, and every clone observes the same `input`, `output`,
//! scratch pad, status, and sent flag. Contexts are created fresh for each
//! request and are never pooled.

use crate::container::Container;
use crate::error::ErrorEnvelope;
use crate::scratchpad::{keys, Scratchpad};
use crate::sink::ResponseSink;
use crate::transport::TransportRequest;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use uuid::Uuid;

/// Unique identifier for a request (UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a new time-ordered request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct RequestState {
    request_id: RequestId,
    transport: TransportRequest,
    input: Container,
    scratchpad: Scratchpad,
    error: OnceLock<ErrorEnvelope>,
    started_at: Instant,
}

/// The request side of one pipeline execution.
///
/// # Example
///
/// ```
/// use kairos_core::{RequestContext, TransportRequest};
/// use serde_json::json;
///
/// let ctx = RequestContext::new(TransportRequest::new("POST", "/api/test"))
///     .with_input(json!({"initial": "seed"}));
///
/// assert_eq!(ctx.method(), Some("POST"));
/// assert_eq!(ctx.input().field("initial"), Some(json!("seed")));
/// assert!(ctx.error().is_none());
/// ```
#[derive(Clone)]
pub struct RequestContext {
    state: Arc<RequestState>,
}

impl RequestContext {
    /// Creates a context for the given transport request with an empty input.
    #[must_use]
    pub fn new(transport: TransportRequest) -> Self {
        Self {
            state: Arc::new(RequestState {
                request_id: RequestId::new(),
                transport,
                input: Container::empty_object(),
                scratchpad: Scratchpad::new(),
                error: OnceLock::new(),
                started_at: Instant::now(),
            }),
        }
    }

    /// Seeds the input container before execution.
    #[must_use]
    pub fn with_input(self, input: Value) -> Self {
        self.state.input.merge(input);
        self
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.state.request_id
    }

    /// Transport method, if known.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.state.transport.method.as_deref()
    }

    /// Transport URL, if known.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.state.transport.url.as_deref()
    }

    /// Raw query parameters.
    #[must_use]
    pub fn query(&self) -> &Map<String, Value> {
        &self.state.transport.query
    }

    /// Raw transport body.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.state.transport.body.as_ref()
    }

    /// The identity-stable input container.
    #[must_use]
    pub fn input(&self) -> &Container {
        &self.state.input
    }

    /// The shared scratch pad.
    #[must_use]
    pub fn scratchpad(&self) -> &Scratchpad {
        &self.state.scratchpad
    }

    /// The normalized error of the current failure episode.
    #[must_use]
    pub fn error(&self) -> Option<&ErrorEnvelope> {
        self.state.error.get()
    }

    /// Time elapsed since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.state.started_at.elapsed()
    }

    /// Derives the input from the transport if nothing seeded it yet.
    ///
    /// Returns `true` if the input was populated.
    pub(crate) fn populate_input(&self, reserved_prefix: &str) -> bool {
        if !self.state.input.is_empty() {
            return false;
        }
        self.state
            .input
            .merge(self.state.transport.derive_input(reserved_prefix));
        true
    }

    /// Records the error once and mirrors it into the scratch pad.
    ///
    /// Returns `false` if an error was already recorded.
    pub(crate) fn record_error(&self, envelope: &ErrorEnvelope) -> bool {
        if self.state.error.set(envelope.clone()).is_err() {
            return false;
        }
        if let Err(e) = self.state.scratchpad.insert_as(keys::ERROR, envelope) {
            tracing::warn!(error = %e, "Failed to mirror error into scratchpad");
        }
        true
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.state.request_id)
            .field("method", &self.state.transport.method)
            .field("url", &self.state.transport.url)
            .field("input", &self.state.input)
            .field("error", &self.state.error.get())
            .finish_non_exhaustive()
    }
}

struct ResponseState {
    output: Container,
    status: AtomicU16,
    sent: AtomicBool,
    emissions: AtomicUsize,
    sink: Mutex<Box<dyn ResponseSink>>,
}

/// The response side of one pipeline execution.
///
/// `status` and `json` chain like a transport response object. Sending is
/// monotonic: once [`response_sent`](Self::response_sent) is `true` it stays
/// `true`, and later bodies are dropped.
///
/// # Example
///
/// ```
/// use kairos_core::{BufferedSink, ResponseContext};
/// use serde_json::json;
///
/// let sink = BufferedSink::new();
/// let res = ResponseContext::new(sink.clone());
/// assert_eq!(res.status_code(), 200);
///
/// res.status(201).json(json!({"created": true}));
/// assert!(res.response_sent());
/// assert_eq!(sink.status(), Some(201));
/// ```
#[derive(Clone)]
pub struct ResponseContext {
    state: Arc<ResponseState>,
}

impl ResponseContext {
    /// Creates a response context writing into `sink`.
    #[must_use]
    pub fn new(sink: impl ResponseSink) -> Self {
        Self {
            state: Arc::new(ResponseState {
                output: Container::new(),
                status: AtomicU16::new(200),
                sent: AtomicBool::new(false),
                emissions: AtomicUsize::new(0),
                sink: Mutex::new(Box::new(sink)),
            }),
        }
    }

    /// The identity-stable output container.
    #[must_use]
    pub fn output(&self) -> &Container {
        &self.state.output
    }

    /// The current status code (200 until set).
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.state.status.load(Ordering::SeqCst)
    }

    /// Returns `true` once a response has been sent by anyone.
    #[must_use]
    pub fn response_sent(&self) -> bool {
        self.state.sent.load(Ordering::SeqCst) || self.state.sink.lock().headers_sent()
    }

    /// Number of bodies written through this context.
    #[must_use]
    pub fn emissions(&self) -> usize {
        self.state.emissions.load(Ordering::SeqCst)
    }

    /// Sets the status code.
    pub fn status(&self, code: u16) -> &Self {
        if self.response_sent() {
            tracing::warn!(status = code, "Ignoring status change after response was sent");
            return self;
        }
        self.state.status.store(code, Ordering::SeqCst);
        self.state.sink.lock().set_status(code);
        self
    }

    /// Sends `payload` as the JSON body and marks the response as sent.
    pub fn json(&self, payload: Value) -> &Self {
        let mut sink = self.state.sink.lock();
        if sink.headers_sent() || self.state.sent.swap(true, Ordering::SeqCst) {
            tracing::warn!("Ignoring response body, a response was already sent");
            return self;
        }
        sink.set_status(self.status_code());
        sink.send_json(payload);
        self.state.emissions.fetch_add(1, Ordering::SeqCst);
        self
    }

    /// Marks the response as sent without writing a body.
    ///
    /// For transports that flush the response through another channel.
    pub fn mark_sent(&self) {
        self.state.sent.store(true, Ordering::SeqCst);
    }
}

impl fmt::Debug for ResponseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseContext")
            .field("output", &self.state.output)
            .field("status", &self.status_code())
            .field("sent", &self.state.sent.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

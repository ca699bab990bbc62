//! Outbound response sinks.
//!
//! The engine never talks to a transport directly. It writes a status and a
//! JSON body into a [`ResponseSink`], and reads back whether the transport
//! already flushed headers. [`BufferedSink`] records what was written so it
//! can be turned into an `http::Response` afterwards.

use bytes::Bytes;
use http_body_util::Full;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// The HTTP response type produced from a [`BufferedSink`].
pub type Response = http::Response<Full<Bytes>>;

/// Destination for the single response of a request.
pub trait ResponseSink: Send + 'static {
    /// Sets the status code that will accompany the body.
    fn set_status(&mut self, status: u16);

    /// Writes the JSON body and terminates the response.
    fn send_json(&mut self, payload: Value);

    /// Returns `true` once the transport has sent headers.
    fn headers_sent(&self) -> bool;
}

#[derive(Debug, Default)]
struct Recorded {
    status: Option<u16>,
    body: Option<Value>,
    sends: usize,
}

/// A sink that keeps the response in memory.
///
/// Clones share the same recording, so a caller can keep one handle and give
/// the other to a [`ResponseContext`](crate::ResponseContext).
///
/// # Example
///
/// ```
/// use kairos_core::{BufferedSink, ResponseSink};
/// use serde_json::json;
///
/// let sink = BufferedSink::new();
/// let mut writer = sink.clone();
/// writer.set_status(201);
/// writer.send_json(json!({"id": 7}));
///
/// assert!(sink.headers_sent());
/// assert_eq!(sink.status(), Some(201));
/// assert_eq!(sink.body(), Some(json!({"id": 7})));
/// ```
#[derive(Debug, Clone, Default)]
pub struct BufferedSink {
    recorded: Arc<Mutex<Recorded>>,
}

impl BufferedSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The status that was set, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.recorded.lock().status
    }

    /// The body that was sent, if any.
    #[must_use]
    pub fn body(&self) -> Option<Value> {
        self.recorded.lock().body.clone()
    }

    /// Number of bodies written into this sink.
    #[must_use]
    pub fn send_count(&self) -> usize {
        self.recorded.lock().sends
    }

    /// Builds an HTTP response from the recording.
    ///
    /// A sink that never received a body produces an empty `500` response.
    #[must_use]
    pub fn into_response(&self) -> Response {
        let recorded = self.recorded.lock();
        let (status, body) = match &recorded.body {
            Some(body) => (recorded.status.unwrap_or(200), Bytes::from(body.to_string())),
            None => (500, Bytes::new()),
        };

        let status = http::StatusCode::from_u16(status)
            .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = http::Response::new(Full::new(body));
        *response.status_mut() = status;
        if recorded.body.is_some() {
            response.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
        }
        response
    }
}

impl ResponseSink for BufferedSink {
    fn set_status(&mut self, status: u16) {
        self.recorded.lock().status = Some(status);
    }

    fn send_json(&mut self, payload: Value) {
        let mut recorded = self.recorded.lock();
        recorded.body = Some(payload);
        recorded.sends += 1;
    }

    fn headers_sent(&self) -> bool {
        self.recorded.lock().sends > 0
    }
}

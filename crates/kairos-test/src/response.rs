//! Test response wrapper.

use crate::error::TestError;
use http_body_util::BodyExt;
use kairos_core::{BufferedSink, ErrorEnvelope, Outcome, RequestContext};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

/// What a pipeline run left behind, with helpers for assertions.
///
/// Responses produced by [`TestClient::send`](crate::TestClientRequest::send)
/// also keep the outcome and the request context, so tests can look at the
/// recorded error and the scratchpad after the run.
pub struct TestResponse {
    status: u16,
    body: Option<Value>,
    sends: usize,
    outcome: Option<Outcome>,
    request: Option<RequestContext>,
}

impl TestResponse {
    /// Captures a finished in-memory run.
    #[must_use]
    pub fn from_run(sink: &BufferedSink, outcome: Outcome, request: RequestContext) -> Self {
        Self {
            status: sink.status().unwrap_or(200),
            body: sink.body(),
            sends: sink.send_count(),
            outcome: Some(outcome),
            request: Some(request),
        }
    }

    /// Reads an HTTP response produced by the `http` adapter.
    pub async fn from_http<B>(response: http::Response<B>) -> Result<Self, TestError>
    where
        B: http_body_util::BodyExt,
        B::Error: fmt::Display,
    {
        let (parts, body) = response.into_parts();
        let bytes = body
            .collect()
            .await
            .map_err(|e| TestError::BodyRead(e.to_string()))?
            .to_bytes();

        let body = if bytes.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&bytes)?)
        };
        let sends = usize::from(body.is_some());

        Ok(Self {
            status: parts.status.as_u16(),
            body,
            sends,
            outcome: None,
            request: None,
        })
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns true if the status is successful (2xx).
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the JSON body, if one was sent.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Deserializes the body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TestError> {
        let body = self.body.clone().ok_or(TestError::MissingBody)?;
        Ok(serde_json::from_value(body)?)
    }

    /// Number of bodies written to the sink.
    #[must_use]
    pub fn send_count(&self) -> usize {
        self.sends
    }

    /// The executor outcome, for in-memory runs.
    #[must_use]
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// The request context after the run, for in-memory runs.
    #[must_use]
    pub fn request(&self) -> Option<&RequestContext> {
        self.request.as_ref()
    }

    /// The error recorded on the request context, if any.
    #[must_use]
    pub fn error(&self) -> Option<&ErrorEnvelope> {
        self.request.as_ref().and_then(RequestContext::error)
    }

    /// Reads a scratchpad entry left by the run.
    #[must_use]
    pub fn scratch(&self, key: &str) -> Option<Value> {
        self.request.as_ref().and_then(|req| req.scratchpad().get(key))
    }

    // Assertion methods

    /// Asserts the status code.
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match.
    pub fn assert_status(&self, expected: u16) -> &Self {
        assert_eq!(
            self.status, expected,
            "Expected status {}, got {} with body {:?}",
            expected, self.status, self.body
        );
        self
    }

    /// Asserts that the response is successful (2xx).
    ///
    /// # Panics
    ///
    /// Panics if the status is not 2xx.
    pub fn assert_success(&self) -> &Self {
        assert!(
            self.is_success(),
            "Expected success status, got {}",
            self.status
        );
        self
    }

    /// Asserts the whole JSON body.
    ///
    /// # Panics
    ///
    /// Panics if no body was sent or it differs.
    pub fn assert_json(&self, expected: &Value) -> &Self {
        assert_eq!(self.body.as_ref(), Some(expected), "Unexpected response body");
        self
    }

    /// Asserts one value of the body addressed by a JSON pointer such as
    /// `/issues/0/code`.
    ///
    /// # Panics
    ///
    /// Panics if the pointer resolves to nothing or to a different value.
    pub fn assert_json_field(&self, pointer: &str, expected: &Value) -> &Self {
        let actual = self.body.as_ref().and_then(|body| body.pointer(pointer));
        assert_eq!(
            actual,
            Some(expected),
            "Expected {pointer} to be {expected}, body was {:?}",
            self.body
        );
        self
    }

    /// Asserts exactly one body was written.
    ///
    /// # Panics
    ///
    /// Panics if zero or several bodies were written.
    pub fn assert_sent_once(&self) -> &Self {
        assert_eq!(self.sends, 1, "Expected exactly one response, got {}", self.sends);
        self
    }

    /// Asserts the run completed without short-circuit or error.
    ///
    /// # Panics
    ///
    /// Panics on any other outcome.
    pub fn assert_completed(&self) -> &Self {
        assert!(
            matches!(self.outcome, Some(Outcome::Completed)),
            "Expected completed run, got {:?}",
            self.outcome
        );
        self
    }

    /// Asserts the run stopped early because a response was sent.
    ///
    /// # Panics
    ///
    /// Panics on any other outcome.
    pub fn assert_short_circuited(&self) -> &Self {
        assert!(
            matches!(self.outcome, Some(Outcome::ShortCircuited { .. })),
            "Expected short-circuited run, got {:?}",
            self.outcome
        );
        self
    }

    /// Asserts the run failed with the given error code.
    ///
    /// # Panics
    ///
    /// Panics if the run did not fail or failed with another code.
    pub fn assert_error_code(&self, code: &str) -> &Self {
        let actual = self.outcome.as_ref().and_then(Outcome::error).map(|e| e.code.as_str());
        assert_eq!(actual, Some(code), "Unexpected error code");
        self
    }
}

impl fmt::Debug for TestResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestResponse")
            .field("status", &self.status)
            .field("body", &self.body)
            .field("sends", &self.sends)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

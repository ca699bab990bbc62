//! Test request building.

use crate::error::TestError;
use bytes::Bytes;
use http::Method;
use kairos_core::{BufferedSink, RequestContext, ResponseContext, TransportRequest};
use serde::Serialize;
use serde_json::Value;

/// A fully built request, ready to run through a pipeline.
#[derive(Debug, Clone)]
pub struct TestRequest {
    /// What the transport delivers.
    pub transport: TransportRequest,
    /// Input seeded before execution, if any.
    pub input: Option<Value>,
    /// Scratchpad entries seeded before execution.
    pub scratch: Vec<(String, Value)>,
}

impl TestRequest {
    /// Creates a new GET request.
    pub fn get(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::GET, uri)
    }

    /// Creates a new POST request.
    pub fn post(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::POST, uri)
    }

    /// Creates a new PUT request.
    pub fn put(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::PUT, uri)
    }

    /// Creates a new PATCH request.
    pub fn patch(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::PATCH, uri)
    }

    /// Creates a new DELETE request.
    pub fn delete(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::DELETE, uri)
    }

    /// Creates fresh contexts for one execution, writing into `sink`.
    #[must_use]
    pub fn into_contexts(self, sink: BufferedSink) -> (RequestContext, ResponseContext) {
        let mut req = RequestContext::new(self.transport);
        if let Some(input) = self.input {
            req = req.with_input(input);
        }
        for (key, value) in self.scratch {
            req.scratchpad().insert(key, value);
        }
        (req, ResponseContext::new(sink))
    }

    /// Converts this request into a buffered HTTP request.
    ///
    /// Seeded input and scratchpad entries have no HTTP form and are dropped.
    pub fn into_http_request(self) -> Result<http::Request<Bytes>, TestError> {
        let method = self.transport.method.as_deref().unwrap_or("GET");
        let uri = self.transport.url.as_deref().unwrap_or("/");
        let body = match &self.transport.body {
            Some(body) => Bytes::from(serde_json::to_vec(body)?),
            None => Bytes::new(),
        };

        http::Request::builder()
            .method(method)
            .uri(uri)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(body)
            .map_err(|e| TestError::RequestBuild(e.to_string()))
    }
}

/// Builder for constructing test requests.
///
/// The query string of the URI is parsed the way a transport would parse
/// it, so reserved keys such as `_rsc` behave exactly as in production.
///
/// # Example
///
/// ```
/// use kairos_test::TestRequest;
/// use serde_json::json;
///
/// let request = TestRequest::post("/users?page=2")
///     .json(&json!({"name": "Ada"}))
///     .scratch("tenant", json!("acme"))
///     .build()
///     .unwrap();
///
/// assert_eq!(request.transport.query["page"], json!("2"));
/// assert_eq!(request.transport.body, Some(json!({"name": "Ada"})));
/// ```
#[must_use]
#[derive(Debug)]
pub struct TestRequestBuilder {
    method: Method,
    uri: String,
    query: Vec<(String, Value)>,
    body: Option<Result<Value, String>>,
    input: Option<Value>,
    scratch: Vec<(String, Value)>,
}

impl TestRequestBuilder {
    /// Creates a new request builder.
    pub fn new(method: Method, uri: impl AsRef<str>) -> Self {
        Self {
            method,
            uri: uri.as_ref().to_string(),
            query: Vec::new(),
            body: None,
            input: None,
            scratch: Vec::new(),
        }
    }

    /// Adds a query parameter on top of those in the URI.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets the request body as JSON.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        self.body = Some(serde_json::to_value(value).map_err(|e| e.to_string()));
        self
    }

    /// Seeds the input container. Seeded input is never replaced by the
    /// transport-derived one.
    pub fn input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    /// Seeds a scratchpad entry.
    pub fn scratch(mut self, key: impl Into<String>, value: Value) -> Self {
        self.scratch.push((key.into(), value));
        self
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns `TestError` if the query string cannot be parsed or the JSON
    /// body failed to serialize.
    pub fn build(self) -> Result<TestRequest, TestError> {
        let mut transport = TransportRequest::new(self.method.as_str(), &self.uri);

        if let Some((_, raw)) = self.uri.split_once('?') {
            transport = transport.with_query_string(raw)?;
        }
        for (key, value) in self.query {
            transport = transport.with_query(key, value);
        }
        if let Some(body) = self.body {
            transport = transport.with_body(body.map_err(TestError::RequestBuild)?);
        }

        Ok(TestRequest {
            transport,
            input: self.input,
            scratch: self.scratch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_methods() {
        assert_eq!(TestRequest::get("/").build().unwrap().transport.method.as_deref(), Some("GET"));
        assert_eq!(TestRequest::put("/").build().unwrap().transport.method.as_deref(), Some("PUT"));
        assert_eq!(
            TestRequest::delete("/").build().unwrap().transport.method.as_deref(),
            Some("DELETE")
        );
    }

    #[test]
    fn test_query_from_uri_and_builder() {
        let request = TestRequest::get("/search?q=rust&tag=a&tag=b")
            .query("page", 3)
            .build()
            .unwrap();

        let query = &request.transport.query;
        assert_eq!(query["q"], json!("rust"));
        assert_eq!(query["tag"], json!(["a", "b"]));
        assert_eq!(query["page"], json!(3));
        assert_eq!(request.transport.url.as_deref(), Some("/search?q=rust&tag=a&tag=b"));
    }

    #[test]
    fn test_into_contexts_seeds_state() {
        let request = TestRequest::post("/items")
            .input(json!({"seeded": true}))
            .scratch("user", json!({"id": 1}))
            .build()
            .unwrap();

        let (req, res) = request.into_contexts(BufferedSink::new());
        assert_eq!(req.input().get(), Some(json!({"seeded": true})));
        assert_eq!(req.scratchpad().get("user"), Some(json!({"id": 1})));
        assert!(!res.response_sent());
    }

    #[test]
    fn test_into_http_request() {
        let request = TestRequest::patch("/items/1?x=1")
            .json(&json!({"qty": 2}))
            .build()
            .unwrap()
            .into_http_request()
            .unwrap();

        assert_eq!(request.method(), Method::PATCH);
        assert_eq!(request.uri().query(), Some("x=1"));
        assert_eq!(request.body().as_ref(), br#"{"qty":2}"#);
    }
}

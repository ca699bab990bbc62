//! Test client for in-memory pipeline runs.

use crate::error::TestError;
use crate::request::{TestRequest, TestRequestBuilder};
use crate::response::TestResponse;
use bytes::Bytes;
use http::Method;
use kairos_core::{BufferedSink, Pipeline};
use serde::Serialize;
use serde_json::Value;

/// Runs requests through a [`Pipeline`] without any transport.
///
/// Every request gets a fresh pair of contexts and its own
/// [`BufferedSink`].
///
/// # Example
///
/// ```
/// use kairos_core::{Pipeline, RequestContext, ResponseContext};
/// use kairos_test::TestClient;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let pipeline = Pipeline::new(|req: RequestContext, _res: ResponseContext| async move {
///     Ok(req.input().get())
/// });
/// let client = TestClient::new(pipeline);
///
/// client
///     .post("/echo?page=1&_rsc=x")
///     .json(&json!({"name": "Ada"}))
///     .send()
///     .await
///     .assert_status(200)
///     .assert_json(&json!({"page": "1", "name": "Ada"}));
/// # });
/// ```
#[must_use]
#[derive(Debug, Clone)]
pub struct TestClient {
    pipeline: Pipeline,
    default_scratch: Vec<(String, Value)>,
}

impl TestClient {
    /// Creates a client around a pipeline.
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            default_scratch: Vec::new(),
        }
    }

    /// Seeds a scratchpad entry into every request.
    pub fn with_default_scratch(mut self, key: impl Into<String>, value: Value) -> Self {
        self.default_scratch.push((key.into(), value));
        self
    }

    /// The wrapped pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Creates a GET request builder.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::get(uri))
    }

    /// Creates a POST request builder.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::post(uri))
    }

    /// Creates a PUT request builder.
    pub fn put(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::put(uri))
    }

    /// Creates a PATCH request builder.
    pub fn patch(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::patch(uri))
    }

    /// Creates a DELETE request builder.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::delete(uri))
    }

    /// Creates a request builder with a custom method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequestBuilder::new(method, uri))
    }

    /// Runs a built request in memory.
    pub async fn run(&self, request: TestRequest) -> TestResponse {
        let sink = BufferedSink::new();
        let (req, res) = request.into_contexts(sink.clone());
        let outcome = self.pipeline.execute(req.clone(), res).await;
        TestResponse::from_run(&sink, outcome, req)
    }

    /// Runs a buffered HTTP request through the `http` adapter.
    pub async fn run_http(&self, request: http::Request<Bytes>) -> Result<TestResponse, TestError> {
        let response = self.pipeline.handle_http(request).await?;
        TestResponse::from_http(response).await
    }
}

/// A request builder bound to a test client.
#[derive(Debug)]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    builder: TestRequestBuilder,
}

impl<'a> TestClientRequest<'a> {
    fn new(client: &'a TestClient, builder: TestRequestBuilder) -> Self {
        let mut builder = builder;
        for (key, value) in &client.default_scratch {
            builder = builder.scratch(key.clone(), value.clone());
        }
        Self { client, builder }
    }

    /// Adds a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.builder = self.builder.query(key, value);
        self
    }

    /// Sets the request body as JSON.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.json(value);
        self
    }

    /// Seeds the input container.
    pub fn input(mut self, input: Value) -> Self {
        self.builder = self.builder.input(input);
        self
    }

    /// Seeds a scratchpad entry.
    pub fn scratch(mut self, key: impl Into<String>, value: Value) -> Self {
        self.builder = self.builder.scratch(key, value);
        self
    }

    /// Sends the request and returns the response.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built; use
    /// [`TestClientRequest::try_send`] to handle that case.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(e) => panic!("invalid test request: {e}"),
        }
    }

    /// Sends the request and returns a Result.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        let request = self.builder.build()?;
        Ok(self.client.run(request).await)
    }
}

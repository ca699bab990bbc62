//! Pipeline builder.
//!
//! A [`Pipeline`] binds one handler to an ordered list of hooks. Building is
//! purely accumulative: `register` appends and returns the pipeline, and
//! nothing runs until [`Pipeline::execute`] is called with a fresh pair of
//! contexts.
//!
//! # Example
//!
//! ```
//! use kairos_core::{BufferedSink, Hook, Pipeline, RequestContext, ResponseContext, TransportRequest};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let pipeline = Pipeline::new(|req: RequestContext, _res: ResponseContext| async move {
//!     let name = req.input().field("name").unwrap_or(json!("world"));
//!     Ok(Some(json!({ "greeting": format!("hello {}", name.as_str().unwrap_or("?")) })))
//! })
//! .register(Hook::named("noop"));
//!
//! let sink = BufferedSink::new();
//! let req = RequestContext::new(TransportRequest::new("POST", "/greet").with_body(json!({"name": "Ada"})));
//! let res = ResponseContext::new(sink.clone());
//!
//! let outcome = pipeline.execute(req, res).await;
//! assert!(outcome.is_completed());
//! assert_eq!(sink.status(), Some(200));
//! assert_eq!(sink.body(), Some(json!({"greeting": "hello Ada"})));
//! # });
//! ```

use crate::context::{RequestContext, ResponseContext};
use crate::executor::{Executor, Outcome};
use crate::hook::{BoxFuture, Hook, IntoHook};
use crate::sink::{BufferedSink, Response};
use crate::transport::{TransportError, TransportRequest};
use bytes::Bytes;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Future returned by the handler. `Some` is merged into the output.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Option<Value>>>;

/// The wrapped handler.
pub type HandlerFn = Arc<dyn Fn(RequestContext, ResponseContext) -> HandlerFuture + Send + Sync>;

/// Default terse message for server errors.
pub const DEFAULT_INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred";

/// Default prefix of transport-internal query keys.
pub const DEFAULT_RESERVED_QUERY_PREFIX: &str = "_";

/// Engine options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Send the full envelope as the fallback body instead of `{code, message}`.
    pub verbose_errors: bool,

    /// Message used in terse fallback bodies for 5xx errors.
    pub internal_error_message: String,

    /// Query keys starting with this prefix never reach `input`.
    /// An empty prefix keeps every key.
    pub reserved_query_prefix: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            verbose_errors: false,
            internal_error_message: DEFAULT_INTERNAL_ERROR_MESSAGE.to_string(),
            reserved_query_prefix: DEFAULT_RESERVED_QUERY_PREFIX.to_string(),
        }
    }
}

impl PipelineOptions {
    /// Options suited for local development: verbose fallbacks.
    #[must_use]
    pub fn development() -> Self {
        Self {
            verbose_errors: true,
            ..Self::default()
        }
    }

    /// Sets `verbose_errors`.
    #[must_use]
    pub fn verbose_errors(mut self, verbose: bool) -> Self {
        self.verbose_errors = verbose;
        self
    }

    /// Sets the terse 5xx message.
    #[must_use]
    pub fn internal_error_message(mut self, message: impl Into<String>) -> Self {
        self.internal_error_message = message.into();
        self
    }

    /// Sets the reserved query prefix.
    #[must_use]
    pub fn reserved_query_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reserved_query_prefix = prefix.into();
        self
    }
}

/// A handler plus its ordered hooks.
///
/// Cloning is cheap; clones share the handler and hook closures, so one
/// pipeline can serve any number of concurrent requests.
#[derive(Clone)]
pub struct Pipeline {
    handler: HandlerFn,
    hooks: Vec<Hook>,
    options: PipelineOptions,
}

impl Pipeline {
    /// Creates a pipeline around `handler` with no hooks.
    pub fn new<H, Fut>(handler: H) -> Self
    where
        H: Fn(RequestContext, ResponseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        let handler: HandlerFn =
            Arc::new(move |req: RequestContext, res: ResponseContext| -> HandlerFuture {
                Box::pin(handler(req, res))
            });

        Self {
            handler,
            hooks: Vec::new(),
            options: PipelineOptions::default(),
        }
    }

    /// Appends a hook and returns the pipeline.
    #[must_use]
    pub fn register(mut self, hook: impl IntoHook) -> Self {
        let hook = hook.into_hook();
        tracing::debug!(
            hook = hook.name(),
            position = self.hooks.len(),
            before = hook.has_before(),
            after = hook.has_after(),
            on_error = hook.has_on_error(),
            "Registered hook"
        );
        self.hooks.push(hook);
        self
    }

    /// Replaces the engine options.
    #[must_use]
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// The current options.
    #[must_use]
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Hook names in registration order.
    #[must_use]
    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(Hook::name).collect()
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Runs one request through the pipeline.
    ///
    /// Never fails: every error is recovered into a response.
    pub async fn execute(&self, req: RequestContext, res: ResponseContext) -> Outcome {
        Executor {
            hooks: &self.hooks,
            handler: &self.handler,
            options: &self.options,
        }
        .run(req, res)
        .await
    }

    /// Runs a buffered HTTP request and returns the HTTP response.
    ///
    /// Fails only if the request cannot be adapted (bad query or non-JSON body).
    pub async fn handle_http(&self, request: http::Request<Bytes>) -> Result<Response, TransportError> {
        let transport = TransportRequest::from_http(&request)?;
        let sink = BufferedSink::new();

        self.execute(RequestContext::new(transport), ResponseContext::new(sink.clone()))
            .await;

        Ok(sink.into_response())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("hooks", &self.hooks)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

//! # Kairos Core
//!
//! Request-lifecycle execution engine for the Kairos middleware toolkit.
//!
//! A [`Pipeline`] wraps a single handler with an ordered list of [`Hook`]s.
//! Each request runs through the same state machine:
//!
//! ```text
//! Init → before (forward) → handler → after (reverse) → respond
//!                 │              │           │
//!                 └──────────────┴───────────┴──→ on_error (reverse) → fallback
//! ```
//!
//! ## Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Pipeline`] | Handler plus ordered hooks |
//! | [`Hook`] | Optional `before`, `after`, and `on_error` stages |
//! | [`RequestContext`] | Input container, scratch pad, transport metadata, error |
//! | [`ResponseContext`] | Output container, status, sent flag, sink |
//! | [`Container`] | Identity-stable value box with merge-on-write |
//! | [`ErrorEnvelope`] | Normalized error handed to `on_error` hooks |
//! | [`Outcome`] | How a run ended |
//!
//! ## Example
//!
//! ```
//! use kairos_core::{
//!     BufferedSink, ErrorEnvelope, Hook, Pipeline, RequestContext, ResponseContext,
//!     TransportRequest,
//! };
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let pipeline = Pipeline::new(|req: RequestContext, _res: ResponseContext| async move {
//!     if req.input().field("age").is_none() {
//!         return Err(anyhow::Error::from(ErrorEnvelope::validation("age is required", json!([]))));
//!     }
//!     Ok(Some(json!({"ok": true})))
//! })
//! .register(Hook::named("timer").before(|req, _res| async move {
//!     req.scratchpad().insert("startTime", json!(0));
//!     Ok(())
//! }));
//!
//! let sink = BufferedSink::new();
//! let req = RequestContext::new(TransportRequest::new("POST", "/users"));
//! let outcome = pipeline.execute(req.clone(), ResponseContext::new(sink.clone())).await;
//!
//! assert!(outcome.is_recovered());
//! assert_eq!(req.error().map(|e| e.code.as_str()), Some("ValidationError"));
//! assert_eq!(sink.status(), Some(400));
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/kairos-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod container;
pub mod context;
pub mod error;
pub mod executor;
pub mod hook;
pub mod pipeline;
pub mod scratchpad;
pub mod sink;
pub mod transport;

pub use container::{Container, ContainerError};
pub use context::{RequestContext, RequestId, ResponseContext};
pub use error::{
    normalize, ErrorEnvelope, INTERNAL_ERROR_CODE, MIDDLEWARE_ERROR_NAME, VALIDATION_ERROR_CODE,
};
pub use executor::{Outcome, Phase};
pub use hook::{AfterFn, BeforeFn, BoxFuture, Hook, HookFuture, HookResult, IntoHook, OnErrorFn};
pub use pipeline::{
    HandlerFn, HandlerFuture, Pipeline, PipelineOptions, DEFAULT_INTERNAL_ERROR_MESSAGE,
    DEFAULT_RESERVED_QUERY_PREFIX,
};
pub use scratchpad::{keys, Scratchpad};
pub use sink::{BufferedSink, Response, ResponseSink};
pub use transport::{TransportError, TransportRequest};

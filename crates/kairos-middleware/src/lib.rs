//! # Kairos Middleware
//!
//! Ready-made hooks for Kairos pipelines. Each one is a thin consumer of the
//! engine in `kairos-core` and is registered like any other hook.
//!
//! | Hook | Stages | Purpose |
//! |------|--------|---------|
//! | [`RequestTelemetry`] | before, after, on_error | Metrics and request logs |
//! | [`ValidationHook`] | before, after | Parse `input`/`output` against a [`Schema`] |
//! | [`ValidationErrorResponder`] | on_error | `{error, issues}` for validation failures |
//! | [`ErrorFormatter`] | on_error | Enriched error, terse or verbose body |
//!
//! ## Example
//!
//! ```
//! use kairos_core::{BufferedSink, Pipeline, RequestContext, ResponseContext, TransportRequest};
//! use kairos_middleware::{
//!     ErrorFormatter, FieldType, ObjectSchema, RequestTelemetry, ValidationErrorResponder,
//!     ValidationHook,
//! };
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let schema = ObjectSchema::builder()
//!     .required("name")
//!     .field("name", FieldType::String)
//!     .build();
//!
//! let pipeline = Pipeline::new(|req: RequestContext, _res: ResponseContext| async move {
//!     Ok(Some(json!({"hello": req.input().field("name")})))
//! })
//! .register(RequestTelemetry::new("greeter"))
//! .register(ErrorFormatter::new())
//! .register(ValidationErrorResponder::new())
//! .register(ValidationHook::new().input(schema));
//!
//! let sink = BufferedSink::new();
//! let req = RequestContext::new(TransportRequest::new("POST", "/greet").with_body(json!({})));
//! pipeline.execute(req, ResponseContext::new(sink.clone())).await;
//!
//! assert_eq!(sink.status(), Some(400));
//! assert_eq!(sink.body().unwrap()["error"], json!("ValidationError"));
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/kairos-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod enriched;
pub mod error_formatting;
pub mod json_schema;
pub mod schema;
pub mod telemetry;
pub mod validation;
pub mod validation_errors;

pub use enriched::EnrichedError;
pub use error_formatting::ErrorFormatter;
pub use json_schema::{JsonSchema, SchemaCompileError};
pub use schema::{FieldType, ObjectSchema, ObjectSchemaBuilder, Schema, ValidationIssue};
pub use telemetry::{RequestTelemetry, TelemetryData};
pub use validation::{validation_error, ValidationHook, ValidationTarget};
pub use validation_errors::ValidationErrorResponder;

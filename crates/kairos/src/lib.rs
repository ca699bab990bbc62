//! # Kairos
//!
//! **Request-lifecycle middleware engine**
//!
//! A pipeline wraps one handler with an ordered list of hooks. Each hook may
//! contribute a `before` stage, an `after` stage, and an `on_error` stage:
//!
//! ```text
//! before(A) → before(B) → handler → after(B) → after(A) → 200 + output
//!      │           │          │         │          │
//!      └───────────┴──────────┴─────────┴──────────┴──→ on_error(B) → on_error(A) → fallback
//! ```
//!
//! - `input` and `output` are long-lived containers; writes merge, identity
//!   never changes
//! - the scratchpad carries state between hooks of one request
//! - sending a response from any stage stops the forward path
//! - every thrown value (and every panic) becomes an
//!   [`ErrorEnvelope`](kairos_core::ErrorEnvelope)
//!
//! ## Quick Start
//!
//! ```
//! use kairos::prelude::*;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), kairos::config::ConfigError> {
//! let config = ConfigLoader::new().with_production().load()?;
//!
//! let pipeline = Pipeline::new(|req: RequestContext, _res: ResponseContext| async move {
//!     let name = req.input().field("name").unwrap_or(json!("world"));
//!     Ok(Some(json!({ "hello": name })))
//! })
//! .with_options(config.pipeline_options())
//! .register(config.request_telemetry())
//! .register(config.error_formatter())
//! .register(ValidationErrorResponder::new());
//!
//! # tokio_test::block_on(async {
//! let sink = BufferedSink::new();
//! let req = RequestContext::new(TransportRequest::new("GET", "/hello").with_query("name", json!("Ada")));
//! let outcome = pipeline.execute(req, ResponseContext::new(sink.clone())).await;
//!
//! assert!(outcome.is_completed());
//! assert_eq!(sink.body(), Some(json!({"hello": "Ada"})));
//! # });
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/kairos/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use kairos_core as core;

// Re-export middleware types
pub use kairos_middleware as middleware;

// Re-export configuration types
pub use kairos_config as config;

// Re-export telemetry setup
pub use kairos_telemetry as telemetry;

/// Commonly used types.
///
/// ```
/// use kairos::prelude::*;
/// ```
pub mod prelude {
    pub use kairos_core::{
        BufferedSink, Container, ErrorEnvelope, Hook, IntoHook, Outcome, Phase, Pipeline,
        PipelineOptions, RequestContext, ResponseContext, ResponseSink, Scratchpad,
        TransportRequest,
    };

    pub use kairos_middleware::{
        ErrorFormatter, FieldType, JsonSchema, ObjectSchema, RequestTelemetry, Schema,
        ValidationErrorResponder, ValidationHook,
    };

    pub use kairos_config::{ConfigLoader, KairosConfig};

    pub use kairos_telemetry::{init_logging, init_metrics, LogConfig, MetricsConfig};
}

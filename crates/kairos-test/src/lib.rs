//! # Kairos Test
//!
//! In-memory test utilities for Kairos pipelines. Requests run straight
//! through [`Pipeline::execute`](kairos_core::Pipeline::execute) with a
//! recording sink, so tests see the status, the body, the executor outcome,
//! and the request context after the run.
//!
//! - [`TestRequest`]: builder producing fresh contexts (query parsing,
//!   JSON body, seeded input and scratchpad entries)
//! - [`TestClient`]: runs requests against one pipeline
//! - [`TestResponse`]: accessors and chained assertions
//!
//! ## Example
//!
//! ```
//! use kairos_core::{ErrorEnvelope, Pipeline, RequestContext, ResponseContext};
//! use kairos_test::TestClient;
//!
//! # tokio_test::block_on(async {
//! let pipeline = Pipeline::new(|_req: RequestContext, _res: ResponseContext| async {
//!     Err(anyhow::Error::from(ErrorEnvelope::new(404, "NotFound", "no such user")))
//! });
//!
//! TestClient::new(pipeline)
//!     .get("/users/7")
//!     .send()
//!     .await
//!     .assert_status(404)
//!     .assert_error_code("NotFound")
//!     .assert_sent_once();
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/kairos-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use request::{TestRequest, TestRequestBuilder};
pub use response::TestResponse;

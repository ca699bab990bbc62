//! Test error types.

use kairos_core::TransportError;
use thiserror::Error;

/// Errors that can occur while building requests or reading responses.
#[derive(Debug, Error)]
pub enum TestError {
    /// The request could not be built.
    #[error("request build error: {0}")]
    RequestBuild(String),

    /// The request could not be adapted into a transport request.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Reading an HTTP response body failed.
    #[error("body read error: {0}")]
    BodyRead(String),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The response carries no body.
    #[error("response has no body")]
    MissingBody,
}

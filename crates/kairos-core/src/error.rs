//! Error envelope and normalization.
//!
//! Every value thrown by a hook or handler is converted into an
//! [`ErrorEnvelope`] before `on_error` hooks see it. Hooks and handlers throw
//! [`anyhow::Error`]; when the thrown error already is an envelope it passes
//! through untouched, anything else becomes an `InternalError` with status 500.
//!
//! # Envelope Format
//!
//! ```json
//! {
//!   "code": "ValidationError",
//!   "message": "Input validation failed",
//!   "status": 400,
//!   "details": [ { "path": ["name"], "code": "required", "message": "..." } ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Code used for any thrown value that is not already an envelope.
pub const INTERNAL_ERROR_CODE: &str = "InternalError";

/// Code used by schema-validation adapters.
pub const VALIDATION_ERROR_CODE: &str = "ValidationError";

/// Name given to envelopes produced by normalization.
pub const MIDDLEWARE_ERROR_NAME: &str = "MiddlewareError";

/// The normalized error representation handed to `on_error` hooks.
///
/// # Example
///
/// ```
/// use kairos_core::ErrorEnvelope;
/// use serde_json::json;
///
/// let err = ErrorEnvelope::validation("Input validation failed", json!([{"path": ["age"]}]));
/// assert_eq!(err.status, 400);
/// assert_eq!(err.code, "ValidationError");
/// assert!(err.details.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct ErrorEnvelope {
    /// Short machine-readable category.
    pub code: String,

    /// Human-readable description.
    pub message: String,

    /// Status surfaced to the client.
    pub status: u16,

    /// Structured payload such as validation issues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,

    /// Error name, mirrors the kind of error that was thrown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Location of the failure inside the input or output payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
}

impl ErrorEnvelope {
    /// Creates an envelope with the given status, code and message.
    #[must_use]
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status,
            details: None,
            name: None,
            path: None,
        }
    }

    /// Creates the default `InternalError` envelope (status 500).
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, INTERNAL_ERROR_CODE, message).with_name(MIDDLEWARE_ERROR_NAME)
    }

    /// Creates a `ValidationError` envelope (status 400) with structured issues.
    #[must_use]
    pub fn validation(message: impl Into<String>, details: Value) -> Self {
        Self::new(400, VALIDATION_ERROR_CODE, message).with_details(details)
    }

    /// Attaches a structured details payload.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Sets the error name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the payload path the error refers to.
    #[must_use]
    pub fn with_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path = Some(path.into_iter().map(Into::into).collect());
        self
    }

    /// Returns `true` for validation envelopes.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        self.code == VALIDATION_ERROR_CODE
    }

    /// Returns `true` if the status is in the 5xx range.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    /// The minimal body sent when no hook responded.
    ///
    /// Server errors replace their message with `internal_message` so that
    /// internal details are not leaked.
    #[must_use]
    pub fn terse_body(&self, internal_message: &str) -> Value {
        let message = if self.is_server_error() {
            internal_message
        } else {
            self.message.as_str()
        };

        serde_json::json!({
            "code": self.code,
            "message": message,
        })
    }

    /// The full envelope as a JSON body.
    #[must_use]
    pub fn verbose_body(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({ "code": self.code, "message": self.message, "status": self.status })
        })
    }
}

/// Normalizes a thrown value into an [`ErrorEnvelope`].
///
/// Envelopes pass through with all of their fields preserved. Any other error
/// becomes an `InternalError` with status 500 whose message is the error's
/// display form.
///
/// # Example
///
/// ```
/// use kairos_core::{normalize, ErrorEnvelope};
///
/// let thrown = anyhow::anyhow!("disk on fire");
/// let envelope = normalize(&thrown);
/// assert_eq!(envelope.code, "InternalError");
/// assert_eq!(envelope.status, 500);
/// assert_eq!(envelope.message, "disk on fire");
///
/// let teapot = ErrorEnvelope::new(418, "Teapot", "short and stout");
/// assert_eq!(normalize(&teapot.clone().into()), teapot);
/// ```
#[must_use]
pub fn normalize(thrown: &anyhow::Error) -> ErrorEnvelope {
    match thrown.downcast_ref::<ErrorEnvelope>() {
        Some(envelope) => envelope.clone(),
        None => ErrorEnvelope::internal(thrown.to_string()),
    }
}

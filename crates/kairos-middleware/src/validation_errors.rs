//! Validation-error responder.
//!
//! An `on_error` hook that answers validation failures only, with the issues
//! laid out for clients:
//!
//! ```json
//! { "error": "ValidationError", "issues": [ { "path": ["name"], "code": "required", ... } ] }
//! ```
//!
//! Register it after a general [`ErrorFormatter`](crate::ErrorFormatter) so it
//! runs first during the reverse `on_error` pass.

use crate::enriched::EnrichedError;
use kairos_core::{ErrorEnvelope, Hook, IntoHook, RequestContext, ResponseContext};
use serde_json::{json, Value};

/// Responds to `ValidationError` envelopes that nothing has answered yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationErrorResponder;

impl ValidationErrorResponder {
    /// Creates the responder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn respond(error: &ErrorEnvelope, req: &RequestContext, res: &ResponseContext) {
        if !error.is_validation() || res.response_sent() {
            return;
        }

        let enriched = EnrichedError::new(error, req);
        enriched.publish(req);

        res.status(error.status).json(json!({
            "error": error.code,
            "issues": error.details.clone().unwrap_or(Value::Array(Vec::new())),
        }));
    }
}

impl IntoHook for ValidationErrorResponder {
    fn into_hook(self) -> Hook {
        Hook::named("validation_errors").on_error(|error: ErrorEnvelope, req, res| async move {
            Self::respond(&error, &req, &res);
            Ok(())
        })
    }
}

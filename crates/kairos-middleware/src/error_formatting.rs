//! Error-formatting hook.
//!
//! An `on_error`-only hook that turns the normalized error into a response.
//! It enriches the envelope with request metadata, logs it, stores it in the
//! scratch pad, and answers with either the full enriched error (verbose) or
//! just `{code, name}`.
//!
//! Verbosity is fixed at construction. Nothing is read from the process
//! environment.
//!
//! ```text
//! terse:   {"code": "InternalError", "name": "MiddlewareError"}
//! verbose: {"name": ..., "code": ..., "message": ..., "status": ..., "method": ...,
//!           "url": ..., "request_id": ..., "timestamp": ...}
//! ```

use crate::enriched::EnrichedError;
use kairos_core::{ErrorEnvelope, Hook, IntoHook, RequestContext, ResponseContext};
use serde_json::json;

/// Responds to any error not already answered.
///
/// # Example
///
/// ```
/// use kairos_core::Pipeline;
/// use kairos_middleware::ErrorFormatter;
///
/// let pipeline = Pipeline::new(|_req, _res| async { Ok(None) })
///     .register(ErrorFormatter::new().verbose(true));
/// assert_eq!(pipeline.hook_names(), vec!["error_formatter"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ErrorFormatter {
    verbose: bool,
}

impl ErrorFormatter {
    /// Creates a terse formatter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the full enriched error is sent.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Returns `true` if the full enriched error is sent.
    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    fn respond(&self, error: &ErrorEnvelope, req: &RequestContext, res: &ResponseContext) {
        if res.response_sent() {
            return;
        }

        let enriched = EnrichedError::new(error, req);
        enriched.publish(req);

        let body = if self.verbose {
            enriched.to_value()
        } else {
            json!({ "code": enriched.code, "name": enriched.name })
        };
        res.status(enriched.status).json(body);
    }
}

impl IntoHook for ErrorFormatter {
    fn into_hook(self) -> Hook {
        Hook::named("error_formatter").on_error(move |error: ErrorEnvelope, req, res| {
            let formatter = self.clone();
            async move {
                formatter.respond(&error, &req, &res);
                Ok(())
            }
        })
    }
}

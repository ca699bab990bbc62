//! Errors enriched with request metadata.

use chrono::{DateTime, Utc};
use kairos_core::{ErrorEnvelope, RequestContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fallback name for envelopes that carry none.
pub const DEFAULT_ERROR_NAME: &str = "Error";

/// An [`ErrorEnvelope`] plus the request it happened on.
///
/// This is the verbose body sent by [`ErrorFormatter`](crate::ErrorFormatter)
/// and the value stored in the scratch pad under `enriched_error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedError {
    /// Error class name.
    pub name: String,
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Response status.
    pub status: u16,
    /// Structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Location of the failure inside the input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    /// Transport method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Transport URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Request ID.
    pub request_id: String,
    /// When the error was enriched.
    pub timestamp: DateTime<Utc>,
}

impl EnrichedError {
    /// Enriches `error` with the metadata of `req`.
    #[must_use]
    pub fn new(error: &ErrorEnvelope, req: &RequestContext) -> Self {
        Self {
            name: error
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_ERROR_NAME.to_string()),
            code: error.code.clone(),
            message: error.message.clone(),
            status: error.status,
            details: error.details.clone(),
            path: error.path.clone(),
            method: req.method().map(str::to_string),
            url: req.url().map(str::to_string),
            request_id: req.request_id().to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Serializes to a JSON body.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Logs the error and stores it in the scratch pad.
    pub(crate) fn publish(&self, req: &RequestContext) {
        tracing::error!(
            request_id = %self.request_id,
            code = %self.code,
            status = self.status,
            method = self.method.as_deref().unwrap_or("-"),
            url = self.url.as_deref().unwrap_or("-"),
            error = %self.message,
            "Request error"
        );
        if let Err(e) = req
            .scratchpad()
            .insert_as(kairos_core::keys::ENRICHED_ERROR, self)
        {
            tracing::warn!(error = %e, "Failed to store enriched error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_core::TransportRequest;
    use serde_json::json;

    #[test]
    fn test_enrichment_copies_request_metadata() {
        let req = RequestContext::new(TransportRequest::new("DELETE", "/users/7"));
        let envelope = ErrorEnvelope::new(404, "NotFound", "no user 7").with_path(["id"]);

        let enriched = EnrichedError::new(&envelope, &req);
        assert_eq!(enriched.name, "Error");
        assert_eq!(enriched.method.as_deref(), Some("DELETE"));
        assert_eq!(enriched.url.as_deref(), Some("/users/7"));
        assert_eq!(enriched.request_id, req.request_id().to_string());
        assert_eq!(enriched.path, Some(vec!["id".to_string()]));
    }

    #[test]
    fn test_body_shape() {
        let req = RequestContext::new(TransportRequest::default());
        let enriched = EnrichedError::new(&ErrorEnvelope::internal("boom"), &req);
        let body = enriched.to_value();

        assert_eq!(body["name"], json!("MiddlewareError"));
        assert_eq!(body["status"], json!(500));
        assert!(body.get("method").is_none());
        assert!(body["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_publish_stores_in_scratchpad() {
        let req = RequestContext::new(TransportRequest::default());
        let enriched = EnrichedError::new(&ErrorEnvelope::new(418, "Teapot", "short"), &req);
        enriched.publish(&req);

        let stored: EnrichedError = req.scratchpad().get_as("enriched_error").unwrap();
        assert_eq!(stored, enriched);
    }
}

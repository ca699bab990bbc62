//! Request telemetry hook.
//!
//! Emits metrics and a structured log line for every run that reaches the
//! `after` or `on_error` stage.
//!
//! | Stage      | Effect |
//! |------------|--------|
//! | `before`   | stamps `startTime` (epoch millis) in the scratch pad, holds an in-flight guard |
//! | `after`    | stamps `endTime` and `duration`, records a completed request |
//! | `on_error` | records the error code and a failed request |
//!
//! Register it first: `after` and `on_error` run in reverse, so the first
//! hook registered observes the run last.

use chrono::Utc;
use kairos_core::{ErrorEnvelope, Hook, IntoHook, RequestContext, ResponseContext};
use kairos_telemetry::metrics::{self, InFlightGuard};
use kairos_telemetry::{log_pipeline_complete, log_pipeline_error};
use serde_json::json;
use std::time::{Duration, Instant};

/// Scratch pad key holding the start time in epoch milliseconds.
pub const START_TIME_KEY: &str = "startTime";

/// Scratch pad key holding the end time in epoch milliseconds.
pub const END_TIME_KEY: &str = "endTime";

/// Scratch pad key holding the duration in milliseconds.
pub const DURATION_KEY: &str = "duration";

#[derive(Debug, Clone, Copy)]
struct Started(Instant);

/// Telemetry collected for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryData {
    /// Service name label.
    pub service_name: String,
    /// Transport method.
    pub method: String,
    /// Transport URL.
    pub url: String,
    /// Status that will be (or was) sent.
    pub status_code: u16,
    /// Run duration in milliseconds.
    pub duration_ms: f64,
    /// Request ID.
    pub request_id: String,
}

/// Metrics and logs for each request.
#[derive(Debug, Clone)]
pub struct RequestTelemetry {
    service_name: String,
}

impl RequestTelemetry {
    /// Creates the hook for `service_name`.
    #[must_use]
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
        }
    }

    /// The service name label.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    fn start(req: &RequestContext) {
        req.scratchpad().set_extension(Started(Instant::now()));
        req.scratchpad().set_extension(InFlightGuard::new());
        req.scratchpad()
            .insert(START_TIME_KEY, json!(Utc::now().timestamp_millis()));
    }

    fn elapsed(req: &RequestContext) -> Duration {
        req.scratchpad()
            .get_extension::<Started>()
            .map_or_else(|| req.elapsed(), |started| started.0.elapsed())
    }

    fn collect(&self, req: &RequestContext, status_code: u16, duration: Duration) -> TelemetryData {
        TelemetryData {
            service_name: self.service_name.clone(),
            method: req.method().unwrap_or("UNKNOWN").to_string(),
            url: req.url().unwrap_or("").to_string(),
            status_code,
            duration_ms: duration.as_secs_f64() * 1000.0,
            request_id: req.request_id().to_string(),
        }
    }

    fn complete(&self, req: &RequestContext, res: &ResponseContext) -> TelemetryData {
        let duration = Self::elapsed(req);
        let end = Utc::now().timestamp_millis();
        let start = req.scratchpad().get_as::<i64>(START_TIME_KEY).unwrap_or(end);
        req.scratchpad().insert(END_TIME_KEY, json!(end));
        req.scratchpad().insert(DURATION_KEY, json!(end - start));

        let data = self.collect(req, res.status_code(), duration);
        metrics::record_request("completed", data.status_code, duration);
        log_pipeline_complete!(data.request_id, data.status_code, data.duration_ms);
        data
    }

    fn fail(&self, error: &ErrorEnvelope, req: &RequestContext) -> TelemetryData {
        let duration = Self::elapsed(req);
        let data = self.collect(req, error.status, duration);
        metrics::record_error(&error.code);
        metrics::record_request("failed", error.status, duration);
        log_pipeline_error!(data.request_id, error.code, data.status_code, data.duration_ms);
        data
    }
}

impl Default for RequestTelemetry {
    fn default() -> Self {
        Self::new("kairos")
    }
}

impl IntoHook for RequestTelemetry {
    fn into_hook(self) -> Hook {
        let on_complete = self.clone();
        let on_failure = self;

        Hook::named("telemetry")
            .before(|req: RequestContext, _res| async move {
                RequestTelemetry::start(&req);
                Ok(())
            })
            .after(move |req: RequestContext, res: ResponseContext, _output| {
                let telemetry = on_complete.clone();
                async move {
                    telemetry.complete(&req, &res);
                    Ok(())
                }
            })
            .on_error(move |error: ErrorEnvelope, req: RequestContext, _res| {
                let telemetry = on_failure.clone();
                async move {
                    telemetry.fail(&error, &req);
                    Ok(())
                }
            })
    }
}

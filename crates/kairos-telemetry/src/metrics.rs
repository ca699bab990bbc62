//! Pipeline metrics.
//!
//! Recording goes through the `metrics` facade, so nothing is collected until
//! a recorder is installed. [`init_metrics`] installs a Prometheus recorder;
//! the text exposition is available from [`render_metrics`].
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `kairos_requests_total` | Counter | `outcome`, `status` | Pipeline runs |
//! | `kairos_request_duration_seconds` | Histogram | `outcome` | Run latency |
//! | `kairos_in_flight_requests` | Gauge | - | Runs in progress |
//! | `kairos_errors_total` | Counter | `code` | Recovered errors |
//! | `kairos_validation_failures_total` | Counter | `target`, `code` | Schema failures |

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether to install the Prometheus recorder.
    pub enabled: bool,

    /// Bucket boundaries (seconds) for the duration histogram.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Installs the global Prometheus recorder.
///
/// Calling it again after a successful install is a no-op, including when
/// several threads call it at once.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let builder = PrometheusBuilder::new()
        .set_buckets(&config.duration_buckets)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = builder
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    if METRICS_HANDLE.set(handle).is_err() {
        return Err(TelemetryError::MetricsInit(
            "metrics handle was set outside init_metrics".to_string(),
        ));
    }
    register_metric_descriptions();
    Ok(())
}

/// Renders every metric in Prometheus text format.
///
/// Returns `None` until [`init_metrics`] succeeded.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!("kairos_requests_total", "Pipeline runs by outcome and status");
    describe_histogram!(
        "kairos_request_duration_seconds",
        "Pipeline run duration in seconds"
    );
    describe_gauge!("kairos_in_flight_requests", "Pipeline runs in progress");
    describe_counter!("kairos_errors_total", "Recovered pipeline errors by code");
    describe_counter!(
        "kairos_validation_failures_total",
        "Schema validation failures by target and code"
    );
}

/// Records a finished run.
pub fn record_request(outcome: &str, status_code: u16, duration: Duration) {
    counter!(
        "kairos_requests_total",
        "outcome" => outcome.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(
        "kairos_request_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records a recovered error.
pub fn record_error(code: &str) {
    counter!("kairos_errors_total", "code" => code.to_string()).increment(1);
}

/// Records a validation failure; `target` is `"input"` or `"output"`.
pub fn record_validation_failure(target: &str, code: &str) {
    counter!(
        "kairos_validation_failures_total",
        "target" => target.to_string(),
        "code" => code.to_string()
    )
    .increment(1);
}

/// Increments the in-flight gauge.
pub fn increment_in_flight() {
    gauge!("kairos_in_flight_requests").increment(1.0);
}

/// Decrements the in-flight gauge.
pub fn decrement_in_flight() {
    gauge!("kairos_in_flight_requests").decrement(1.0);
}

/// Keeps the in-flight gauge balanced; decrements on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the gauge and returns the guard.
    #[must_use]
    pub fn new() -> Self {
        increment_in_flight();
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        decrement_in_flight();
    }
}

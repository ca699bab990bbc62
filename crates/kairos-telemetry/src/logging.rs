//! Structured logging for Kairos.
//!
//! Installs a `tracing-subscriber` registry with an env filter and either a
//! JSON or a pretty formatter. The executor logs inside a `pipeline` span
//! that carries the request ID, method, and URL, so every event emitted by a
//! hook is correlated with its request.
//!
//! # Example
//!
//! ```rust,ignore
//! use kairos_telemetry::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(hook = "auth", "Registered");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Filter directive (e.g. `"info"`, `"kairos_core=debug,warn"`).
    pub level: String,

    /// Whether to output JSON.
    pub json_format: bool,

    /// Whether to log span open/close events.
    pub span_events: bool,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include thread IDs.
    pub thread_ids: bool,

    /// Whether to include the target (module path).
    pub include_target: bool,

    /// Service name for log fields.
    pub service_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// Human-readable output at debug level.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            json_format: false,
            span_events: true,
            file_line_info: true,
            thread_ids: false,
            include_target: true,
            service_name: "kairos".to_string(),
        }
    }

    /// JSON output at info level.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            span_events: false,
            file_line_info: false,
            thread_ids: false,
            include_target: true,
            service_name: "kairos".to_string(),
        }
    }
}

/// Initializes the global subscriber.
///
/// Returns `TelemetryError::LoggingInit` if a global subscriber is already
/// installed, and `TelemetryError::InvalidFilter` for a bad `level`.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    tracing::debug!(service = %config.service_name, "Logging initialized");
    Ok(())
}

/// Parses a filter directive.
pub fn create_env_filter(directive: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(directive).map_err(|e| TelemetryError::InvalidFilter {
        directive: directive.to_string(),
        reason: e.to_string(),
    })
}

/// Field names emitted by [`log_pipeline_complete!`] and [`log_pipeline_error!`].
pub mod fields {
    /// Request ID.
    pub const REQUEST_ID: &str = "request_id";

    /// Response status.
    pub const HTTP_STATUS: &str = "http.status_code";

    /// Duration in milliseconds.
    pub const DURATION_MS: &str = "duration_ms";

    /// Error code.
    pub const ERROR_CODE: &str = "error.code";
}

/// Logs a completed pipeline run.
#[macro_export]
macro_rules! log_pipeline_complete {
    ($request_id:expr, $status:expr, $duration_ms:expr) => {
        $crate::__private::tracing::info!(
            request_id = %$request_id,
            http.status_code = $status,
            duration_ms = $duration_ms,
            "Request completed"
        );
    };
}

/// Logs a failed pipeline run.
#[macro_export]
macro_rules! log_pipeline_error {
    ($request_id:expr, $code:expr, $status:expr, $duration_ms:expr) => {
        $crate::__private::tracing::warn!(
            request_id = %$request_id,
            error.code = %$code,
            http.status_code = $status,
            duration_ms = $duration_ms,
            "Request failed"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[test]
    fn test_default_is_production() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert!(config.json_format);
        assert_eq!(config.level, "info");
        assert_eq!(config, LogConfig::production());
    }

    #[test]
    fn test_development_config() {
        let config = LogConfig::development();
        assert!(!config.json_format);
        assert!(config.span_events);
        assert!(config.file_line_info);
        assert_eq!(config.level, "debug");
    }

    #[test]
    fn test_create_env_filter() {
        assert!(create_env_filter("info").is_ok());
        assert!(create_env_filter("kairos_core=debug,warn").is_ok());
        assert!(matches!(
            create_env_filter("kairos_core=[{"),
            Err(TelemetryError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_disabled_logging() {
        let config = LogConfig {
            enabled: false,
            ..LogConfig::default()
        };
        assert!(init_logging(&config).is_ok());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: LogConfig = serde_json::from_str(r#"{"level": "trace"}"#).unwrap();
        assert_eq!(config.level, "trace");
        assert!(config.json_format);

        let unknown = serde_json::from_str::<LogConfig>(r#"{"colour": true}"#);
        assert!(unknown.is_err());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture_json(log: impl FnOnce()) -> serde_json::Value {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(captured.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, log);

        let bytes = captured.0.lock().unwrap().clone();
        let line = String::from_utf8(bytes).unwrap();
        serde_json::from_str(line.trim()).unwrap()
    }

    #[test]
    fn test_macros_emit_documented_fields() {
        let complete = capture_json(|| { log_pipeline_complete!("req-1", 200u16, 1.5); });
        assert_eq!(complete["fields"][fields::REQUEST_ID], "req-1");
        assert_eq!(complete["fields"][fields::HTTP_STATUS], 200);
        assert_eq!(complete["fields"][fields::DURATION_MS], 1.5);

        let failed = capture_json(|| { log_pipeline_error!("req-2", "InternalError", 500u16, 2.0); });
        assert_eq!(failed["fields"][fields::REQUEST_ID], "req-2");
        assert_eq!(failed["fields"][fields::ERROR_CODE], "InternalError");
        assert_eq!(failed["fields"][fields::HTTP_STATUS], 500);
        assert_eq!(failed["level"], "WARN");
    }
}

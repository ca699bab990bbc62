//! # Kairos Telemetry
//!
//! Logging and metrics setup for services built on Kairos pipelines.
//!
//! - [`logging`]: `tracing-subscriber` initialization, JSON or pretty output
//! - [`metrics`]: Prometheus recorder and the standard pipeline metrics
//!
//! # Example
//!
//! ```rust,ignore
//! use kairos_telemetry::{init_logging, init_metrics, LogConfig, MetricsConfig};
//!
//! init_logging(&LogConfig::production())?;
//! init_metrics(&MetricsConfig::default())?;
//! ```

#![doc(html_root_url = "https://docs.rs/kairos-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig};
pub use self::metrics::{init_metrics, render_metrics, InFlightGuard, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[doc(hidden)]
pub mod __private {
    pub use tracing;
}

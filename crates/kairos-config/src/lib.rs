//! Typed configuration for Kairos.
//!
//! [`KairosConfig`] gathers the settings that shape a pipeline without
//! touching its hooks: error verbosity, the terse 5xx message, the reserved
//! query prefix, and the logging/metrics setup. It converts into
//! [`kairos_core::PipelineOptions`] and into preconfigured middleware.
//!
//! # Example
//!
//! ```
//! use kairos_config::ConfigLoader;
//!
//! # fn main() -> Result<(), kairos_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_string(
//!         r#"
//!         [errors]
//!         verbose = true
//!
//!         [logging]
//!         service_name = "orders"
//!         "#,
//!         "toml",
//!     )?
//!     .load()?;
//!
//! let options = config.pipeline_options();
//! assert!(options.verbose_errors);
//! # Ok(())
//! # }
//! ```
//!
//! # File format
//!
//! ```toml
//! [errors]
//! verbose = false
//! internal_error_message = "An internal error occurred"
//!
//! [input]
//! reserved_query_prefix = "_"
//!
//! [logging]
//! level = "info"
//! json_format = true
//! service_name = "kairos"
//!
//! [metrics]
//! enabled = true
//! duration_buckets = [0.005, 0.05, 0.5, 5.0]
//! ```
//!
//! # Environment overrides
//!
//! `PREFIX__SECTION__KEY`, for example `KAIROS__ERRORS__VERBOSE=true` or
//! `KAIROS__METRICS__DURATION_BUCKETS=0.01,0.1,1`. Unknown keys under the
//! prefix are rejected.

#![doc(html_root_url = "https://docs.rs/kairos-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;

pub use config::{ErrorsConfig, InputConfig, KairosConfig};
pub use error::ConfigError;
pub use kairos_telemetry::{LogConfig, MetricsConfig};
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};

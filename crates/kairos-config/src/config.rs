//! Main configuration types.

use kairos_core::{PipelineOptions, DEFAULT_INTERNAL_ERROR_MESSAGE, DEFAULT_RESERVED_QUERY_PREFIX};
use kairos_middleware::{ErrorFormatter, RequestTelemetry};
use kairos_telemetry::{create_env_filter, LogConfig, MetricsConfig};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Root configuration for a Kairos deployment.
///
/// Every section is optional in files; missing sections and fields keep
/// their defaults. Unknown fields are rejected.
///
/// # Example
///
/// ```
/// use kairos_config::KairosConfig;
///
/// let config = KairosConfig::default();
/// assert!(!config.errors.verbose);
/// assert_eq!(config.input.reserved_query_prefix, "_");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KairosConfig {
    /// Error response settings.
    pub errors: ErrorsConfig,

    /// Input derivation settings.
    pub input: InputConfig,

    /// Logging settings.
    pub logging: LogConfig,

    /// Metrics settings.
    pub metrics: MetricsConfig,
}

/// Error response settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ErrorsConfig {
    /// Expose full error details in fallback and formatter responses.
    pub verbose: bool,

    /// Message sent instead of the real one for 5xx errors in terse mode.
    pub internal_error_message: String,
}

impl Default for ErrorsConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            internal_error_message: DEFAULT_INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }
}

/// Input derivation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    /// Query keys with this prefix are never copied into `input`.
    pub reserved_query_prefix: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            reserved_query_prefix: DEFAULT_RESERVED_QUERY_PREFIX.to_string(),
        }
    }
}

impl KairosConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - `errors.internal_error_message` is blank
    /// - `logging.level` is not a valid filter directive
    /// - `metrics.duration_buckets` is empty, non-positive, or unsorted
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.errors.internal_error_message.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "errors.internal_error_message",
                "must not be empty",
            ));
        }

        if self.logging.enabled {
            create_env_filter(&self.logging.level)
                .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        }

        if self.metrics.enabled {
            let buckets = &self.metrics.duration_buckets;
            if buckets.is_empty() {
                return Err(ConfigError::invalid_value(
                    "metrics.duration_buckets",
                    "must contain at least one bucket",
                ));
            }
            if buckets.iter().any(|b| !b.is_finite() || *b <= 0.0) {
                return Err(ConfigError::invalid_value(
                    "metrics.duration_buckets",
                    "buckets must be positive numbers",
                ));
            }
            if buckets.windows(2).any(|w| w[0] >= w[1]) {
                return Err(ConfigError::invalid_value(
                    "metrics.duration_buckets",
                    "buckets must be strictly increasing",
                ));
            }
        }

        Ok(())
    }

    /// Development preset: verbose errors and human-readable debug logs.
    ///
    /// ```
    /// use kairos_config::KairosConfig;
    ///
    /// let config = KairosConfig::development();
    /// assert!(config.errors.verbose);
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        Self {
            errors: ErrorsConfig {
                verbose: true,
                ..ErrorsConfig::default()
            },
            logging: LogConfig::development(),
            ..Self::default()
        }
    }

    /// Production preset: terse errors and JSON logs.
    #[must_use]
    pub fn production() -> Self {
        Self {
            logging: LogConfig::production(),
            ..Self::default()
        }
    }

    /// Engine options derived from this configuration.
    #[must_use]
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions::default()
            .verbose_errors(self.errors.verbose)
            .internal_error_message(self.errors.internal_error_message.clone())
            .reserved_query_prefix(self.input.reserved_query_prefix.clone())
    }

    /// An error formatting hook whose verbosity follows `errors.verbose`.
    #[must_use]
    pub fn error_formatter(&self) -> ErrorFormatter {
        ErrorFormatter::new().verbose(self.errors.verbose)
    }

    /// A telemetry hook labelled with the logging service name.
    #[must_use]
    pub fn request_telemetry(&self) -> RequestTelemetry {
        RequestTelemetry::new(&self.logging.service_name)
    }
}

//! Layered configuration loader.
//!
//! Layers apply in order, later layers overriding earlier ones:
//! 1. Defaults or a preset
//! 2. Configuration files and strings (TOML or JSON)
//! 3. Environment variables (`PREFIX__SECTION__KEY`)
//!
//! File layers are deep-merged over the current configuration, so a file
//! that only sets `[errors] verbose = true` keeps every other value,
//! including the ones chosen by a preset.

use std::env;
use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::{ConfigError, KairosConfig};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "KAIROS";

/// Configuration loader.
///
/// # Example
///
/// ```no_run
/// use kairos_config::ConfigLoader;
///
/// # fn main() -> Result<(), kairos_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_production()
///     .with_optional_file("kairos.toml")?
///     .with_dotenv()?
///     .with_env_prefix("KAIROS")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: KairosConfig,
    env_prefix: Option<String>,
    files_loaded: usize,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: KairosConfig::default(),
            env_prefix: None,
            files_loaded: 0,
        }
    }

    /// Reset to default values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = KairosConfig::default();
        self
    }

    /// Reset to the development preset.
    ///
    /// ```
    /// use kairos_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert!(config.errors.verbose);
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = KairosConfig::development();
        self
    }

    /// Reset to the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = KairosConfig::production();
        self
    }

    /// Merge a configuration file; the format follows the extension
    /// (`.toml` or `.json`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, has an
    /// unsupported extension, fails to parse, or contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| ConfigError::unsupported_format(path.display().to_string()))?;

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let mut loader = self.with_string(&content, &format)?;
        loader.files_loaded += 1;
        Ok(loader)
    }

    /// Merge a configuration file if it exists.
    ///
    /// # Errors
    ///
    /// Same as [`ConfigLoader::with_file`] when the file exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Merge configuration text in the given format (`"toml"` or `"json"`).
    ///
    /// ```
    /// use kairos_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[input]\nreserved_query_prefix = \"$\"", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.input.reserved_query_prefix, "$");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the format is unsupported, the text fails
    /// to parse, or the merged result contains unknown fields.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer: Value = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::unsupported_format(other)),
        };

        let mut merged = serde_json::to_value(&self.config)?;
        deep_merge(&mut merged, layer);
        self.config = serde_json::from_value(merged)?;
        Ok(self)
    }

    /// Enable environment overrides with the given prefix.
    ///
    /// With prefix `KAIROS`, `KAIROS__ERRORS__VERBOSE=true` sets
    /// `errors.verbose`. Overrides apply when [`ConfigLoader::load`] runs.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load variables from a `.env` file in the working directory, if any.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Dotenv` if the file exists but is malformed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::Dotenv(e.to_string())),
        }
    }

    /// Number of files merged so far.
    #[must_use]
    pub fn files_loaded(&self) -> usize {
        self.files_loaded
    }

    /// Apply environment overrides, validate, and return the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or the final
    /// configuration is invalid.
    pub fn load(mut self) -> Result<KairosConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_vars(&prefix, env::vars())?;
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Return the configuration without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> KairosConfig {
        self.config
    }

    fn apply_env_vars<I>(&mut self, prefix: &str, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{prefix}__");
        for (key, value) in vars {
            if let Some(path) = key.strip_prefix(&marker) {
                let parts: Vec<&str> = path.split("__").collect();
                self.apply_env_var(&key, &parts, &value)?;
            }
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, parts: &[&str], value: &str) -> Result<(), ConfigError> {
        let config = &mut self.config;
        let flag = || parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"));

        match parts {
            ["ERRORS", "VERBOSE"] => config.errors.verbose = flag()?,
            ["ERRORS", "INTERNAL_ERROR_MESSAGE"] => {
                config.errors.internal_error_message = value.to_string();
            }

            ["INPUT", "RESERVED_QUERY_PREFIX"] => {
                config.input.reserved_query_prefix = value.to_string();
            }

            ["LOGGING", "ENABLED"] => config.logging.enabled = flag()?,
            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "JSON_FORMAT"] => config.logging.json_format = flag()?,
            ["LOGGING", "SPAN_EVENTS"] => config.logging.span_events = flag()?,
            ["LOGGING", "FILE_LINE_INFO"] => config.logging.file_line_info = flag()?,
            ["LOGGING", "THREAD_IDS"] => config.logging.thread_ids = flag()?,
            ["LOGGING", "INCLUDE_TARGET"] => config.logging.include_target = flag()?,
            ["LOGGING", "SERVICE_NAME"] => config.logging.service_name = value.to_string(),

            ["METRICS", "ENABLED"] => config.metrics.enabled = flag()?,
            ["METRICS", "DURATION_BUCKETS"] => {
                config.metrics.duration_buckets = value
                    .split(',')
                    .map(|b| b.trim().parse::<f64>())
                    .collect::<Result<_, _>>()
                    .map_err(|_| {
                        ConfigError::env_parse_error(key, "expected comma-separated numbers")
                    })?;
            }

            _ => return Err(ConfigError::env_parse_error(key, "unknown configuration key")),
        }

        Ok(())
    }
}

/// Parse a boolean from an environment value.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Recursively merges `layer` into `base`; objects merge, everything else
/// replaces.
fn deep_merge(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => merge_maps(base, layer),
        (base, layer) => *base = layer,
    }
}

fn merge_maps(base: &mut Map<String, Value>, layer: Map<String, Value>) {
    for (key, value) in layer {
        match base.get_mut(&key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, KairosConfig::default());
    }

    #[test]
    fn test_loader_with_development() {
        let config = ConfigLoader::new().with_development().load().unwrap();
        assert!(config.errors.verbose);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_loader_with_production() {
        let config = ConfigLoader::new()
            .with_development()
            .with_production()
            .load()
            .unwrap();
        assert!(!config.errors.verbose);
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_loader_with_string_json() {
        let config = ConfigLoader::new()
            .with_string(r#"{"errors": {"internal_error_message": "Try again later"}}"#, "json")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.errors.internal_error_message, "Try again later");
        assert!(!config.errors.verbose);
    }

    #[test]
    fn test_string_layer_keeps_preset_values() {
        let config = ConfigLoader::new()
            .with_development()
            .with_string("[logging]\nservice_name = \"billing\"", "toml")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.logging.service_name, "billing");
        assert_eq!(config.logging.level, "debug");
        assert!(config.errors.verbose);
    }

    #[test]
    fn test_unsupported_format() {
        let err = ConfigLoader::new().with_string("a: 1", "yaml").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_unknown_field_in_string() {
        let result = ConfigLoader::new().with_string("[errors]\nshow_stack = true", "toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let err = ConfigLoader::new().with_file("/nonexistent/kairos.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let loader = ConfigLoader::new()
            .with_optional_file("/nonexistent/kairos.toml")
            .unwrap();
        assert_eq!(loader.files_loaded(), 0);
        assert_eq!(loader.load().unwrap(), KairosConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_vars(
                "KAIROS",
                vars(&[
                    ("KAIROS__ERRORS__VERBOSE", "yes"),
                    ("KAIROS__INPUT__RESERVED_QUERY_PREFIX", "$"),
                    ("KAIROS__LOGGING__LEVEL", "warn"),
                    ("KAIROS__METRICS__DURATION_BUCKETS", "0.1, 0.5,1"),
                    ("PATH", "/usr/bin"),
                    ("KAIROSX__ERRORS__VERBOSE", "nonsense"),
                ]),
            )
            .unwrap();

        let config = loader.load_unvalidated();
        assert!(config.errors.verbose);
        assert_eq!(config.input.reserved_query_prefix, "$");
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.metrics.duration_buckets, vec![0.1, 0.5, 1.0]);
    }

    #[test]
    fn test_env_bad_boolean() {
        let mut loader = ConfigLoader::new();
        let err = loader
            .apply_env_vars("KAIROS", vars(&[("KAIROS__ERRORS__VERBOSE", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("expected boolean"));
    }

    #[test]
    fn test_env_unknown_key() {
        let mut loader = ConfigLoader::new();
        let err = loader
            .apply_env_vars("KAIROS", vars(&[("KAIROS__ERRORS__STACK", "1")]))
            .unwrap_err();
        assert!(err.to_string().contains("KAIROS__ERRORS__STACK"));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_deep_merge() {
        let mut base = json!({"a": {"b": 1, "c": 2}, "d": [1, 2]});
        deep_merge(&mut base, json!({"a": {"c": 3, "e": 4}, "d": [9]}));
        assert_eq!(base, json!({"a": {"b": 1, "c": 3, "e": 4}, "d": [9]}));
    }
}

//! Schema-validation hook.
//!
//! Validates `input` before the handler and `output` after it. A successful
//! parse is merged back into the container, so defaults filled in by the
//! schema become visible to the handler while earlier references stay valid.
//! A failed parse throws a `ValidationError` envelope with status 400 whose
//! `details` are the issues.

use crate::schema::{Schema, ValidationIssue};
use kairos_core::{Container, ErrorEnvelope, Hook, HookResult, IntoHook};
use kairos_telemetry::metrics::record_validation_failure;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Message used when `input` fails validation.
pub const INPUT_VALIDATION_MESSAGE: &str = "Input validation failed";

/// Message used when `output` fails validation.
pub const OUTPUT_VALIDATION_MESSAGE: &str = "Output validation failed";

/// Which container a schema applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationTarget {
    /// The request input.
    Input,
    /// The response output.
    Output,
}

impl ValidationTarget {
    /// Returns the target name used in logs and metrics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }

    const fn message(self) -> &'static str {
        match self {
            Self::Input => INPUT_VALIDATION_MESSAGE,
            Self::Output => OUTPUT_VALIDATION_MESSAGE,
        }
    }
}

/// Validates `input` and/or `output` against schemas.
///
/// # Example
///
/// ```
/// use kairos_middleware::{FieldType, ObjectSchema, ValidationHook};
/// use kairos_core::IntoHook;
///
/// let hook = ValidationHook::new()
///     .input(ObjectSchema::builder().required("name").field("name", FieldType::String).build())
///     .into_hook();
///
/// assert!(hook.has_before());
/// assert!(!hook.has_after());
/// ```
#[derive(Clone, Default)]
pub struct ValidationHook {
    input: Option<Arc<dyn Schema>>,
    output: Option<Arc<dyn Schema>>,
}

impl ValidationHook {
    /// Creates a hook with no schemas.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `input` in the `before` stage.
    #[must_use]
    pub fn input(mut self, schema: impl Schema + 'static) -> Self {
        self.input = Some(Arc::new(schema));
        self
    }

    /// Validates `output` in the `after` stage.
    #[must_use]
    pub fn output(mut self, schema: impl Schema + 'static) -> Self {
        self.output = Some(Arc::new(schema));
        self
    }
}

impl fmt::Debug for ValidationHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationHook")
            .field("input", &self.input.is_some())
            .field("output", &self.output.is_some())
            .finish()
    }
}

impl IntoHook for ValidationHook {
    fn into_hook(self) -> Hook {
        let mut hook = Hook::named("validation");

        if let Some(schema) = self.input {
            hook = hook.before(move |req, _res| {
                let schema = schema.clone();
                async move {
                    let current = req.input().get().unwrap_or(Value::Null);
                    apply(schema.as_ref(), &current, req.input(), ValidationTarget::Input)
                }
            });
        }

        if let Some(schema) = self.output {
            hook = hook.after(move |_req, res, output: Value| {
                let schema = schema.clone();
                async move { apply(schema.as_ref(), &output, res.output(), ValidationTarget::Output) }
            });
        }

        hook
    }
}

/// Validates `value` and merges the parsed result into `container`.
fn apply(schema: &dyn Schema, value: &Value, container: &Container, target: ValidationTarget) -> HookResult {
    match schema.validate(value) {
        Ok(parsed) => {
            container.merge(parsed);
            Ok(())
        }
        Err(issues) => {
            for issue in &issues {
                record_validation_failure(target.name(), &issue.code);
            }
            tracing::debug!(
                target_container = target.name(),
                issues = issues.len(),
                "Validation failed"
            );
            Err(validation_error(target, &issues).into())
        }
    }
}

/// Builds the envelope thrown for `issues`.
#[must_use]
pub fn validation_error(target: ValidationTarget, issues: &[ValidationIssue]) -> ErrorEnvelope {
    let details = serde_json::to_value(issues).unwrap_or_default();
    ErrorEnvelope::validation(target.message(), details)
}

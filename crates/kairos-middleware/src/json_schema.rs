//! JSON Schema documents as [`Schema`]s.
//!
//! [`JsonSchema`] compiles a Draft 7 document with the `jsonschema` crate and
//! reports every violation as a [`ValidationIssue`]. Issue codes line up with
//! [`ObjectSchema`](crate::ObjectSchema) for the keywords both understand
//! (`required`, `type`, `additionalProperties`); any other keyword is used
//! as the code verbatim.

use crate::schema::{codes, kind_of, Schema, ValidationIssue};
use jsonschema::error::{TypeKind, ValidationErrorKind};
use jsonschema::{Draft, JSONSchema, ValidationError};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Error returned when a schema document does not compile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid JSON schema: {0}")]
pub struct SchemaCompileError(String);

/// A compiled JSON Schema document.
///
/// # Example
///
/// ```
/// use kairos_middleware::{JsonSchema, Schema};
/// use serde_json::json;
///
/// let schema = JsonSchema::compile(&json!({
///     "type": "object",
///     "required": ["name"],
///     "properties": {"name": {"type": "string"}}
/// }))
/// .unwrap();
///
/// assert!(schema.validate(&json!({"name": "Ada"})).is_ok());
///
/// let issues = schema.validate(&json!({})).unwrap_err();
/// assert_eq!(issues[0].code, "required");
/// assert_eq!(issues[0].path, vec!["name"]);
/// ```
#[derive(Clone)]
pub struct JsonSchema {
    document: Value,
    compiled: Arc<JSONSchema>,
}

impl JsonSchema {
    /// Compiles `document` as a Draft 7 schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaCompileError`] if the document is not a valid schema.
    pub fn compile(document: &Value) -> Result<Self, SchemaCompileError> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(document)
            .map_err(|e| SchemaCompileError(e.to_string()))?;

        Ok(Self {
            document: document.clone(),
            compiled: Arc::new(compiled),
        })
    }

    /// The schema document this was compiled from.
    #[must_use]
    pub fn document(&self) -> &Value {
        &self.document
    }
}

impl fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchema")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl Schema for JsonSchema {
    fn validate(&self, value: &Value) -> Result<Value, Vec<ValidationIssue>> {
        match self.compiled.validate(value) {
            Ok(()) => Ok(value.clone()),
            Err(errors) => Err(errors.flat_map(|error| issues_from(&error)).collect()),
        }
    }
}

fn issues_from(error: &ValidationError<'_>) -> Vec<ValidationIssue> {
    let path = error.instance_path.clone().into_vec();
    let message = error.to_string();

    match &error.kind {
        ValidationErrorKind::Required { property } => {
            let mut path = path;
            if let Some(name) = property.as_str() {
                path.push(name.to_string());
            }
            vec![ValidationIssue::new(path, codes::REQUIRED, message)]
        }
        ValidationErrorKind::Type { kind } => {
            let issue = ValidationIssue::new(path, codes::INVALID_TYPE, message);
            match kind {
                TypeKind::Single(expected) => {
                    vec![issue.with_types(expected.to_string(), kind_of(&error.instance))]
                }
                TypeKind::Multiple(_) => vec![issue],
            }
        }
        ValidationErrorKind::AdditionalProperties { unexpected } => unexpected
            .iter()
            .map(|key| {
                let mut key_path = path.clone();
                key_path.push(key.clone());
                ValidationIssue::new(
                    key_path,
                    codes::UNRECOGNIZED_KEY,
                    format!("Unrecognized key: '{key}'"),
                )
            })
            .collect(),
        _ => {
            let keyword = error
                .schema_path
                .clone()
                .into_vec()
                .pop()
                .unwrap_or_else(|| "invalid".to_string());
            vec![ValidationIssue::new(path, keyword, message)]
        }
    }
}

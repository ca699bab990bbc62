//! Minimal object schemas.
//!
//! [`Schema`] is the seam for plugging a validation library into
//! [`ValidationHook`](crate::ValidationHook). [`JsonSchema`](crate::JsonSchema)
//! validates against JSON Schema documents. [`ObjectSchema`] is a small
//! built-in alternative with required fields, field types, nested objects,
//! defaults, and an additional-field policy. Any `Fn(&Value) -> Result<Value, Vec<ValidationIssue>>`
//! is a schema too.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Issue codes shared by the bundled schemas.
pub mod codes {
    /// A required field is missing.
    pub const REQUIRED: &str = "required";
    /// A value has the wrong type.
    pub const INVALID_TYPE: &str = "invalid_type";
    /// A field is not part of the schema.
    pub const UNRECOGNIZED_KEY: &str = "unrecognized_keys";
}

/// One problem found while validating a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Location of the offending value; empty for the root.
    pub path: Vec<String>,
    /// Machine-readable issue code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Expected type, if the issue is about types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Received type, if the issue is about types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
}

impl ValidationIssue {
    /// Creates an issue.
    #[must_use]
    pub fn new(path: Vec<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path,
            code: code.into(),
            message: message.into(),
            expected: None,
            received: None,
        }
    }

    /// Attaches expected and received type names.
    #[must_use]
    pub fn with_types(mut self, expected: impl Into<String>, received: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.received = Some(received.into());
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path.join("."), self.message)
        }
    }
}

/// Parses a value, returning the parsed form or every issue found.
pub trait Schema: Send + Sync {
    /// Validates `value`.
    fn validate(&self, value: &Value) -> Result<Value, Vec<ValidationIssue>>;
}

impl<F> Schema for F
where
    F: Fn(&Value) -> Result<Value, Vec<ValidationIssue>> + Send + Sync,
{
    fn validate(&self, value: &Value) -> Result<Value, Vec<ValidationIssue>> {
        self(value)
    }
}

/// Field type for [`ObjectSchema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// String type.
    String,
    /// Integer type.
    Integer,
    /// Number type (integer or float).
    Number,
    /// Boolean type.
    Boolean,
    /// Array type.
    Array,
    /// Object type.
    Object,
    /// Any type (no validation).
    Any,
}

impl FieldType {
    /// Returns `true` if `value` has this type.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }

    /// Type name used in issues.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}

/// Type name of a JSON value, as used in `received`.
#[must_use]
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A schema for JSON objects.
///
/// # Example
///
/// ```
/// use kairos_middleware::{FieldType, ObjectSchema, Schema};
/// use serde_json::json;
///
/// let schema = ObjectSchema::builder()
///     .required("name")
///     .field("name", FieldType::String)
///     .field("age", FieldType::Integer)
///     .default_value("role", json!("member"))
///     .build();
///
/// let parsed = schema.validate(&json!({"name": "Ada", "age": 36})).unwrap();
/// assert_eq!(parsed, json!({"name": "Ada", "age": 36, "role": "member"}));
///
/// let issues = schema.validate(&json!({"age": "old"})).unwrap_err();
/// assert_eq!(issues.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    required_fields: Vec<String>,
    field_types: BTreeMap<String, FieldType>,
    nested: BTreeMap<String, ObjectSchema>,
    defaults: BTreeMap<String, Value>,
    allow_additional: bool,
}

impl ObjectSchema {
    /// Creates a schema builder.
    #[must_use]
    pub fn builder() -> ObjectSchemaBuilder {
        ObjectSchemaBuilder::default()
    }

    /// A schema that accepts any object.
    #[must_use]
    pub fn any() -> Self {
        Self {
            allow_additional: true,
            ..Self::default()
        }
    }

    fn is_known(&self, field: &str) -> bool {
        self.field_types.contains_key(field)
            || self.nested.contains_key(field)
            || self.defaults.contains_key(field)
            || self.required_fields.iter().any(|f| f == field)
    }

    fn validate_at(&self, value: &Value, path: &[String], issues: &mut Vec<ValidationIssue>) -> Value {
        let Some(object) = value.as_object() else {
            issues.push(
                ValidationIssue::new(
                    path.to_vec(),
                    codes::INVALID_TYPE,
                    format!("Expected object, received {}", kind_of(value)),
                )
                .with_types("object", kind_of(value)),
            );
            return Value::Null;
        };

        let mut parsed = object.clone();
        for (field, default) in &self.defaults {
            if !parsed.contains_key(field) {
                parsed.insert(field.clone(), default.clone());
            }
        }

        for field in &self.required_fields {
            if !parsed.contains_key(field) {
                let expected = self.field_types.get(field).map_or("any", |t| t.name());
                issues.push(
                    ValidationIssue::new(child(path, field), codes::REQUIRED, "Required")
                        .with_types(expected, "undefined"),
                );
            }
        }

        let mut result = Map::new();
        for (field, value) in parsed {
            let field_path = child(path, &field);

            if let Some(schema) = self.nested.get(&field) {
                let nested = schema.validate_at(&value, &field_path, issues);
                result.insert(field, nested);
                continue;
            }

            if let Some(expected) = self.field_types.get(&field) {
                if !expected.matches(&value) {
                    issues.push(
                        ValidationIssue::new(
                            field_path,
                            codes::INVALID_TYPE,
                            format!("Expected {}, received {}", expected.name(), kind_of(&value)),
                        )
                        .with_types(expected.name(), kind_of(&value)),
                    );
                }
            } else if !self.allow_additional && !self.is_known(&field) {
                issues.push(ValidationIssue::new(
                    field_path,
                    codes::UNRECOGNIZED_KEY,
                    format!("Unrecognized key: '{field}'"),
                ));
            }
            result.insert(field, value);
        }

        Value::Object(result)
    }
}

fn child(path: &[String], field: &str) -> Vec<String> {
    let mut next = path.to_vec();
    next.push(field.to_string());
    next
}

impl Schema for ObjectSchema {
    fn validate(&self, value: &Value) -> Result<Value, Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        let parsed = self.validate_at(value, &[], &mut issues);
        if issues.is_empty() {
            Ok(parsed)
        } else {
            Err(issues)
        }
    }
}

/// Builder for [`ObjectSchema`].
#[derive(Debug, Default)]
pub struct ObjectSchemaBuilder {
    schema: ObjectSchema,
}

impl ObjectSchemaBuilder {
    /// Adds a required field.
    #[must_use]
    pub fn required(mut self, field: &str) -> Self {
        self.schema.required_fields.push(field.to_string());
        self
    }

    /// Adds a field with a specific type.
    #[must_use]
    pub fn field(mut self, name: &str, field_type: FieldType) -> Self {
        self.schema.field_types.insert(name.to_string(), field_type);
        self
    }

    /// Adds a nested object field validated by `schema`.
    #[must_use]
    pub fn nested(mut self, name: &str, schema: ObjectSchema) -> Self {
        self.schema.nested.insert(name.to_string(), schema);
        self
    }

    /// Fills `name` with `value` when it is missing.
    #[must_use]
    pub fn default_value(mut self, name: &str, value: Value) -> Self {
        self.schema.defaults.insert(name.to_string(), value);
        self
    }

    /// Sets whether fields outside the schema are accepted.
    #[must_use]
    pub fn allow_additional(mut self, allow: bool) -> Self {
        self.schema.allow_additional = allow;
        self
    }

    /// Builds the schema.
    #[must_use]
    pub fn build(self) -> ObjectSchema {
        self.schema
    }
}

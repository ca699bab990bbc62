//! Inbound transport boundary.
//!
//! The engine only needs four things from a transport request: the method,
//! the URL, the query mapping, and an optional body. [`TransportRequest`]
//! carries exactly those. [`TransportRequest::from_http`] adapts a buffered
//! `http::Request`.

use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while adapting a transport request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The query string is not valid `application/x-www-form-urlencoded`.
    #[error("invalid query string: {0}")]
    InvalidQuery(#[from] serde_urlencoded::de::Error),

    /// The body is not valid JSON.
    #[error("invalid JSON body: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

/// The transport data the engine derives `input` from.
///
/// # Example
///
/// ```
/// use kairos_core::TransportRequest;
/// use serde_json::json;
///
/// let request = TransportRequest::new("POST", "/api/users?page=2&_rsc=abc")
///     .with_query_string("page=2&_rsc=abc")
///     .unwrap()
///     .with_body(json!({"name": "Ada"}));
///
/// let input = request.derive_input("_");
/// assert_eq!(input, json!({"page": "2", "name": "Ada"}));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportRequest {
    /// HTTP method, if the transport reports one.
    pub method: Option<String>,

    /// Request URL as received.
    pub url: Option<String>,

    /// Query parameters; repeated keys hold arrays.
    pub query: Map<String, Value>,

    /// Parsed body, if any.
    pub body: Option<Value>,
}

impl TransportRequest {
    /// Creates a request with the given method and URL.
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Adds a single query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: Value) -> Self {
        self.query.insert(key.into(), value);
        self
    }

    /// Parses and adds every pair of a raw query string.
    pub fn with_query_string(mut self, query: &str) -> Result<Self, TransportError> {
        for (key, value) in parse_query(query)? {
            self.query.insert(key, value);
        }
        Ok(self)
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Builds a transport request from a buffered HTTP request.
    ///
    /// An empty body yields `None`; anything else must be JSON.
    pub fn from_http(request: &http::Request<Bytes>) -> Result<Self, TransportError> {
        let query = match request.uri().query() {
            Some(raw) => parse_query(raw)?,
            None => Map::new(),
        };

        let body = if request.body().is_empty() {
            None
        } else {
            Some(serde_json::from_slice(request.body())?)
        };

        Ok(Self {
            method: Some(request.method().to_string()),
            url: Some(request.uri().to_string()),
            query,
            body,
        })
    }

    /// Derives the initial input: query parameters without reserved keys,
    /// overridden by the fields of an object body.
    ///
    /// Bodies that are not objects contribute nothing.
    #[must_use]
    pub fn derive_input(&self, reserved_prefix: &str) -> Value {
        let mut input: Map<String, Value> = self
            .query
            .iter()
            .filter(|(key, _)| reserved_prefix.is_empty() || !key.starts_with(reserved_prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        match &self.body {
            Some(Value::Object(body)) => {
                input.extend(body.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Some(Value::Null) | None => {}
            Some(other) => {
                tracing::debug!(kind = value_kind(other), "Ignoring non-object body for input");
            }
        }

        Value::Object(input)
    }
}

/// Parses a query string; repeated keys collapse into an array.
fn parse_query(raw: &str) -> Result<Map<String, Value>, TransportError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw)?;
    let mut query = Map::new();

    for (key, value) in pairs {
        match query.get_mut(&key) {
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                query.insert(key, Value::String(value));
            }
        }
    }

    Ok(query)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

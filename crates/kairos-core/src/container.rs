//! Identity-stable payload containers.
//!
//! A [`Container`] is a shared handle to a JSON payload. Cloning the handle
//! never copies the payload: every clone observes the same contents, so a
//! handler that captured `input` before any hook ran still sees the fields
//! those hooks contributed.
//!
//! Writes go through [`Container::merge`]. Merging an object into an object
//! adds or overwrites keys; any other combination replaces the contents. In
//! both cases the container itself stays the same.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised when reading a container as a typed value.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The container holds no value yet.
    #[error("container is undefined")]
    Undefined,

    /// The contents do not match the requested type.
    #[error("failed to convert container contents: {0}")]
    Conversion(#[from] serde_json::Error),
}

/// A shared, identity-stable JSON payload.
///
/// # Example
///
/// ```
/// use kairos_core::Container;
/// use serde_json::json;
///
/// let input = Container::from_value(json!({"initial": "seed"}));
/// let captured = input.clone();
///
/// input.merge(json!({"first": "one"}));
/// input.merge(json!({"second": "two"}));
///
/// assert!(captured.ptr_eq(&input));
/// assert_eq!(
///     captured.get(),
///     Some(json!({"initial": "seed", "first": "one", "second": "two"}))
/// );
/// ```
#[derive(Clone, Default)]
pub struct Container {
    inner: Arc<RwLock<Option<Value>>>,
}

impl Container {
    /// Creates an undefined container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a container holding an empty object.
    #[must_use]
    pub fn empty_object() -> Self {
        Self::from_value(Value::Object(Map::new()))
    }

    /// Creates a container holding `value`.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(value))),
        }
    }

    /// Returns `true` if both handles point at the same container.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns `true` if the container holds a value.
    #[must_use]
    pub fn is_defined(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Returns `true` if the container is undefined, null, or an empty
    /// object, array, or string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &*self.inner.read() {
            None | Some(Value::Null) => true,
            Some(Value::Object(map)) => map.is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        }
    }

    /// Returns a snapshot of the contents.
    #[must_use]
    pub fn get(&self) -> Option<Value> {
        self.inner.read().clone()
    }

    /// Returns a single top-level field, if the contents are an object.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<Value> {
        self.inner
            .read()
            .as_ref()
            .and_then(|value| value.get(key))
            .cloned()
    }

    /// Merges `value` into the container.
    ///
    /// Object into object is a shallow key merge where incoming keys win.
    /// Anything else replaces the contents.
    pub fn merge(&self, value: Value) {
        let mut guard = self.inner.write();
        if let Value::Object(incoming) = value {
            if let Some(Value::Object(existing)) = guard.as_mut() {
                existing.extend(incoming);
                return;
            }
            *guard = Some(Value::Object(incoming));
        } else {
            *guard = Some(value);
        }
    }

    /// Serializes `value` and merges it into the container.
    pub fn merge_from<T: Serialize>(&self, value: &T) -> Result<(), ContainerError> {
        self.merge(serde_json::to_value(value)?);
        Ok(())
    }

    /// Sets a single top-level field.
    ///
    /// If the container does not hold an object it is turned into one first.
    pub fn set_field(&self, key: impl Into<String>, value: Value) {
        let mut guard = self.inner.write();
        if !matches!(guard.as_ref(), Some(Value::Object(_))) {
            *guard = Some(Value::Object(Map::new()));
        }
        if let Some(Value::Object(map)) = guard.as_mut() {
            map.insert(key.into(), value);
        }
    }

    /// Removes a top-level field and returns it.
    pub fn remove_field(&self, key: &str) -> Option<Value> {
        match self.inner.write().as_mut() {
            Some(Value::Object(map)) => map.remove(key),
            _ => None,
        }
    }

    /// Mutates the contents in place.
    ///
    /// # Deadlocks
    ///
    /// `f` runs while the write lock is held and the lock is not reentrant.
    /// Calling any method on this container, or on a clone of it, from inside
    /// `f` deadlocks. Read other containers before calling `update`, or work
    /// on the `&mut Option<Value>` directly.
    pub fn update<R>(&self, f: impl FnOnce(&mut Option<Value>) -> R) -> R {
        let mut guard = self.inner.write();
        f(&mut *guard)
    }

    /// Deserializes the contents into `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ContainerError> {
        let value = self.get().ok_or(ContainerError::Undefined)?;
        Ok(serde_json::from_value(value)?)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Container").field(&*self.inner.read()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_new_container_is_undefined() {
        let container = Container::new();
        assert!(!container.is_defined());
        assert!(container.is_empty());
        assert_eq!(container.get(), None);
    }

    #[test]
    fn test_merge_objects_keeps_existing_keys() {
        let container = Container::from_value(json!({"a": 1, "b": 2}));
        container.merge(json!({"b": 3, "c": 4}));
        assert_eq!(container.get(), Some(json!({"a": 1, "b": 3, "c": 4})));
    }

    #[test]
    fn test_merge_into_undefined_sets_value() {
        let container = Container::new();
        container.merge(json!({"result": 10}));
        assert_eq!(container.get(), Some(json!({"result": 10})));
    }

    #[test]
    fn test_merge_non_object_replaces_contents() {
        let container = Container::from_value(json!({"a": 1}));
        let handle = container.clone();
        container.merge(json!([1, 2, 3]));
        assert_eq!(handle.get(), Some(json!([1, 2, 3])));
        assert!(handle.ptr_eq(&container));
    }

    #[test]
    fn test_clone_shares_identity() {
        let a = Container::empty_object();
        let b = a.clone();
        let c = Container::empty_object();
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));

        b.set_field("name", json!("Ada"));
        assert_eq!(a.field("name"), Some(json!("Ada")));
    }

    #[test]
    fn test_set_field_on_scalar_turns_into_object() {
        let container = Container::from_value(json!(42));
        container.set_field("answer", json!(42));
        assert_eq!(container.get(), Some(json!({"answer": 42})));
    }

    #[test]
    fn test_remove_field() {
        let container = Container::from_value(json!({"keep": true, "drop": true}));
        assert_eq!(container.remove_field("drop"), Some(json!(true)));
        assert_eq!(container.remove_field("missing"), None);
        assert_eq!(container.get(), Some(json!({"keep": true})));
    }

    #[test]
    fn test_update_in_place() {
        let container = Container::from_value(json!({"counter": 1}));
        container.update(|value| {
            if let Some(Value::Object(map)) = value {
                map.insert("counter".to_string(), json!(4));
            }
        });
        assert_eq!(container.field("counter"), Some(json!(4)));
    }

    #[test]
    fn test_update_can_read_other_containers() {
        let source = Container::from_value(json!({"name": "Ada"}));
        let target = Container::empty_object();

        let copied = target.update(|value| {
            let name = source.field("name");
            if let (Some(Value::Object(map)), Some(name)) = (value.as_mut(), name.clone()) {
                map.insert("name".to_string(), name);
            }
            name.is_some()
        });

        assert!(copied);
        assert_eq!(target.get(), Some(json!({"name": "Ada"})));
        assert!(!target.ptr_eq(&source));
    }

    #[test]
    fn test_parse_typed() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Input {
            name: String,
        }

        let container = Container::from_value(json!({"name": "Eugene", "extra": 1}));
        let input: Input = container.parse().unwrap();
        assert_eq!(input, Input { name: "Eugene".to_string() });

        let undefined = Container::new();
        assert!(matches!(
            undefined.parse::<Input>(),
            Err(ContainerError::Undefined)
        ));
    }

    #[test]
    fn test_merge_from_serializable() {
        #[derive(Serialize)]
        struct Patch {
            title: &'static str,
        }

        let container = Container::from_value(json!({"name": "Eugene"}));
        container.merge_from(&Patch { title: "Mr" }).unwrap();
        assert_eq!(container.get(), Some(json!({"name": "Eugene", "title": "Mr"})));
    }

    #[test]
    fn test_is_empty_variants() {
        assert!(Container::empty_object().is_empty());
        assert!(Container::from_value(Value::Null).is_empty());
        assert!(!Container::from_value(json!({"a": 1})).is_empty());
        assert!(!Container::from_value(json!(0)).is_empty());
    }

    proptest! {
        #[test]
        fn prop_merge_never_loses_untouched_keys(
            base in proptest::collection::hash_map("[a-e]", 0i64..100, 0..5),
            patch in proptest::collection::hash_map("[c-h]", 0i64..100, 0..5),
        ) {
            let container = Container::from_value(json!(base));
            let handle = container.clone();
            container.merge(json!(patch));

            let merged = handle.get().unwrap();
            for (key, value) in &base {
                let expected = patch.get(key).unwrap_or(value);
                prop_assert_eq!(&merged[key.as_str()], &json!(expected));
            }
            for (key, value) in &patch {
                prop_assert_eq!(&merged[key.as_str()], &json!(value));
            }
            prop_assert!(handle.ptr_eq(&container));
        }
    }
}

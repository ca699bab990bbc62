//! Per-request scratch pad shared by hooks.
//!
//! The scratch pad has no schema. Producers and consumers agree on keys by
//! convention; nothing checks that two hooks mean the same thing by `"start"`.
//! JSON entries are the common case. Type-keyed extensions hold state that is
//! not JSON, such as an [`Instant`](std::time::Instant).

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Well-known scratch pad keys written by the engine and bundled hooks.
pub mod keys {
    /// The normalized error of the current failure episode.
    pub const ERROR: &str = "error";

    /// The enriched error built by the error-formatting hook.
    pub const ENRICHED_ERROR: &str = "enriched_error";
}

#[derive(Default)]
struct Slots {
    entries: HashMap<String, Value>,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

/// Shared, schema-free state for hook-to-hook communication.
///
/// Cloning returns another handle to the same scratch pad.
///
/// # Example
///
/// ```
/// use kairos_core::Scratchpad;
/// use serde_json::json;
///
/// let pad = Scratchpad::new();
/// pad.insert("startTime", json!(100));
///
/// let other = pad.clone();
/// other.insert("endTime", json!(150));
///
/// let duration = pad.get_as::<i64>("endTime").unwrap() - pad.get_as::<i64>("startTime").unwrap();
/// assert_eq!(duration, 50);
/// ```
#[derive(Clone, Default)]
pub struct Scratchpad {
    slots: Arc<RwLock<Slots>>,
}

impl Scratchpad {
    /// Creates an empty scratch pad.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the entry stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.slots.read().entries.get(key).cloned()
    }

    /// Deserializes the entry stored under `key`.
    ///
    /// Returns `None` if the key is missing or has a different shape.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    /// Stores `value` under `key`, returning the previous entry.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.slots.write().entries.insert(key.into(), value)
    }

    /// Serializes and stores `value` under `key`.
    pub fn insert_as<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Option<Value>, serde_json::Error> {
        let value = serde_json::to_value(value)?;
        Ok(self.insert(key, value))
    }

    /// Removes and returns the entry stored under `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.slots.write().entries.remove(key)
    }

    /// Returns `true` if an entry exists for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.slots.read().entries.contains_key(key)
    }

    /// Mutates the entry under `key` in place, inserting `Null` first if absent.
    ///
    /// # Deadlocks
    ///
    /// `f` runs while the write lock is held and the lock is not reentrant.
    /// Calling any method on this scratch pad, or on a clone of it, from
    /// inside `f` deadlocks. Read the other entries first and move them in.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut Value) -> R) -> R {
        let mut slots = self.slots.write();
        let entry = slots.entries.entry(key.to_string()).or_insert(Value::Null);
        f(entry)
    }

    /// Returns a copy of every JSON entry.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.slots.read().entries.clone()
    }

    /// Number of JSON entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().entries.len()
    }

    /// Returns `true` if there are no JSON entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.read().entries.is_empty()
    }

    /// Stores a typed extension value.
    pub fn set_extension<T: Send + Sync + 'static>(&self, value: T) {
        self.slots
            .write()
            .extensions
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a copy of a typed extension value.
    #[must_use]
    pub fn get_extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.slots
            .read()
            .extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&self) -> Option<T> {
        self.slots
            .write()
            .extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.slots.read().extensions.contains_key(&TypeId::of::<T>())
    }
}

impl fmt::Debug for Scratchpad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.read();
        f.debug_struct("Scratchpad")
            .field("entries", &slots.entries)
            .field("extensions", &slots.extensions.len())
            .finish()
    }
}

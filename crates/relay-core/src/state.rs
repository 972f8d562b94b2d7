//! Per-request state shared between middleware units.
//!
//! Units communicate by writing typed values under string keys. Reading a key
//! that was never written, or reading it as the wrong type, yields `None`.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Key under which the authentication unit stores the caller [`Identity`](crate::Identity).
pub const IDENTITY_KEY: &str = "identity";

/// Key under which the request-id unit stores the [`RequestId`](crate::RequestId).
pub const REQUEST_ID_KEY: &str = "request_id";

/// A string-keyed bag of typed values.
///
/// # Example
///
/// ```
/// use relay_core::State;
///
/// let mut state = State::new();
/// state.insert("attempts", 3_u32);
///
/// assert_eq!(state.get::<u32>("attempts"), Some(&3));
/// assert_eq!(state.get::<String>("attempts"), None);
/// assert_eq!(state.get::<u32>("missing"), None);
/// ```
#[derive(Default)]
pub struct State {
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl State {
    /// Creates an empty state bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Returns the value under `key` if present and of type `T`.
    #[must_use]
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Returns a mutable reference to the value under `key` if present and of type `T`.
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    /// Removes and returns the value under `key` if it has type `T`.
    ///
    /// A value of a different type is left in place.
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        if !self.values.get(key).is_some_and(|v| v.is::<T>()) {
            return None;
        }
        self.values
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    /// Returns true if any value is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterates over stored keys in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("State").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_key_is_stable() {
        let state = State::new();
        let first = state.get::<String>("user");
        let second = state.get::<String>("user");
        assert!(first.is_none());
        assert_eq!(first, second);
    }

    #[test]
    fn test_wrong_type_reads_as_absent() {
        let mut state = State::new();
        state.insert("count", 7_i64);
        assert!(state.get::<i32>("count").is_none());
        assert_eq!(state.get::<i64>("count"), Some(&7));
        assert!(state.contains_key("count"));
    }

    #[test]
    fn test_insert_replaces() {
        let mut state = State::new();
        state.insert("k", "first".to_string());
        state.insert("k", "second".to_string());
        assert_eq!(state.len(), 1);
        assert_eq!(state.get::<String>("k").map(String::as_str), Some("second"));
    }

    #[test]
    fn test_get_mut() {
        let mut state = State::new();
        state.insert("hits", 1_u32);
        if let Some(hits) = state.get_mut::<u32>("hits") {
            *hits += 1;
        }
        assert_eq!(state.get::<u32>("hits"), Some(&2));
    }

    #[test]
    fn test_remove_checks_type() {
        let mut state = State::new();
        state.insert("k", 5_u8);
        assert_eq!(state.remove::<u16>("k"), None);
        assert!(state.contains_key("k"));
        assert_eq!(state.remove::<u8>("k"), Some(5));
        assert!(state.is_empty());
    }

    #[test]
    fn test_debug_lists_keys() {
        let mut state = State::new();
        state.insert("b", 1);
        state.insert("a", 2);
        assert_eq!(format!("{state:?}"), r#"State { keys: ["a", "b"] }"#);
    }
}

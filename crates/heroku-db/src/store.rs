//! In-memory store: owner → namespace → key → value

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Key inside an owner namespace.
///
/// Integer keys are stored under their decimal form, which is how they
/// appear in the JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Str(String),
    Int(i64),
}

impl Key {
    /// Form the key takes inside the stored document
    pub fn as_stored(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => f.write_str(s),
            Key::Int(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::Str(s.clone())
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Key::Int(i64::from(i))
    }
}

impl From<u32> for Key {
    fn from(i: u32) -> Self {
        Key::Int(i64::from(i))
    }
}

/// The whole database: a mapping from owner to its namespace.
///
/// Owner values are expected to be JSON objects. Anything else is a broken
/// entry that [`crate::guard::autofix`] drops.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Store {
    owners: Map<String, Value>,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(owners: Map<String, Value>) -> Self {
        Self { owners }
    }

    /// Direct lookup of a single value
    pub fn get(&self, owner: &str, key: &str) -> Option<&Value> {
        self.namespace(owner)?.get(key)
    }

    /// Namespace of an owner, if present and well-formed
    pub fn namespace(&self, owner: &str) -> Option<&Map<String, Value>> {
        self.owners.get(owner)?.as_object()
    }

    /// Namespace of an owner, created empty when missing.
    ///
    /// A non-object owner entry is replaced by an empty namespace.
    pub fn namespace_mut(&mut self, owner: &str) -> &mut Map<String, Value> {
        let slot = self
            .owners
            .entry(owner.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            tracing::warn!(
                "Dropped owner {} while writing into it, because it is not a mapping",
                owner
            );
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => map,
            _ => unreachable!("owner slot was just made an object"),
        }
    }

    /// Write a single value, creating the namespace if needed
    pub fn insert(&mut self, owner: &str, key: &str, value: Value) -> Option<Value> {
        self.namespace_mut(owner).insert(key.to_string(), value)
    }

    /// Slot at `(owner, key)`, filled with `default` when absent
    pub fn entry_or_insert(&mut self, owner: &str, key: &str, default: &Value) -> &mut Value {
        self.namespace_mut(owner)
            .entry(key.to_string())
            .or_insert_with(|| default.clone())
    }

    pub fn remove(&mut self, owner: &str, key: &str) -> Option<Value> {
        match self.owners.get_mut(owner) {
            Some(Value::Object(ns)) => ns.remove(key),
            _ => None,
        }
    }

    /// Replace a whole owner entry without any shape check
    pub fn insert_raw(&mut self, owner: impl Into<String>, value: Value) -> Option<Value> {
        self.owners.insert(owner.into(), value)
    }

    pub fn remove_owner(&mut self, owner: &str) -> Option<Value> {
        self.owners.remove(owner)
    }

    /// Owner names in document order
    pub fn owners(&self) -> impl Iterator<Item = &String> {
        self.owners.keys()
    }

    /// Raw owner entries, broken ones included
    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.owners.iter()
    }

    pub(crate) fn owners_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.owners
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.owners
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn clear(&mut self) {
        self.owners.clear();
    }

    /// The whole store as one JSON value
    pub fn to_value(&self) -> Value {
        Value::Object(self.owners.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_keys_are_stored_as_decimal() {
        assert_eq!(Key::from(42).as_stored(), "42");
        assert_eq!(Key::from(-7i64).as_stored(), "-7");
        assert_eq!(Key::from("name").as_stored(), "name");
    }

    #[test]
    fn test_insert_and_get() {
        let mut store = Store::new();
        assert!(store.insert("mod", "token", json!("abc")).is_none());
        assert_eq!(store.get("mod", "token"), Some(&json!("abc")));
        assert!(store.get("mod", "missing").is_none());
        assert!(store.get("other", "token").is_none());
    }

    #[test]
    fn test_namespace_mut_replaces_broken_owner() {
        let mut store = Store::new();
        store.insert_raw("mod", json!(5));
        assert!(store.namespace("mod").is_none());

        store.insert("mod", "k", json!(1));
        assert_eq!(store.get("mod", "k"), Some(&json!(1)));
    }

    #[test]
    fn test_entry_or_insert_keeps_existing() {
        let mut store = Store::new();
        store.insert("mod", "list", json!([1]));
        let slot = store.entry_or_insert("mod", "list", &json!([]));
        assert_eq!(slot, &json!([1]));

        let slot = store.entry_or_insert("mod", "fresh", &json!({}));
        assert_eq!(slot, &json!({}));
    }

    #[test]
    fn test_serializes_as_plain_document() {
        let mut store = Store::new();
        store.insert("mod", "k", json!(true));
        let text = serde_json::to_string(&store).unwrap();
        assert_eq!(text, r#"{"mod":{"k":true}}"#);

        let back: Store = serde_json::from_str(&text).unwrap();
        assert_eq!(back, store);
    }
}

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::TypedMap;
use crate::guard::{self, kind_name};
use crate::store::Key;
use crate::{Database, DbError, Result};

/// Live mapping at `(owner, key)`
#[derive(Debug, Clone)]
pub struct MapPointer {
    db: Database,
    owner: String,
    key: String,
    default: Value,
}

impl MapPointer {
    pub(crate) fn new(db: Database, owner: &str, key: String, default: Value) -> Self {
        Self {
            db,
            owner: owner.to_string(),
            key,
            default,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn typed<T>(self) -> TypedMap<T>
    where
        T: Serialize + DeserializeOwned,
    {
        TypedMap::new(self)
    }

    fn read<R>(&self, f: impl FnOnce(&Map<String, Value>) -> R) -> R {
        self.db
            .with_slot(&self.owner, &self.key, &self.default, |slot| match slot {
                Value::Object(map) => f(map),
                Value::Null => match &self.default {
                    Value::Object(map) => f(map),
                    _ => f(&Map::new()),
                },
                other => {
                    tracing::warn!(
                        "Mapping pointer at {}/{} now holds a {}, reading it as empty",
                        self.owner,
                        self.key,
                        kind_name(other)
                    );
                    f(&Map::new())
                }
            })
    }

    pub(crate) fn modify<R>(
        &self,
        f: impl FnOnce(&mut Map<String, Value>) -> Result<R>,
    ) -> Result<R> {
        self.db
            .modify_slot(&self.owner, &self.key, &self.default, |slot| {
                f(self.as_map(slot)?)
            })
    }

    /// Like [`MapPointer::modify`], but `f` runs on a copy with no lock held
    pub(crate) fn modify_detached<R>(
        &self,
        f: impl FnOnce(&mut Map<String, Value>) -> Result<R>,
    ) -> Result<R> {
        self.db
            .modify_slot_detached(&self.owner, &self.key, &self.default, |slot| {
                f(self.as_map(slot)?)
            })
    }

    fn as_map<'a>(&self, slot: &'a mut Value) -> Result<&'a mut Map<String, Value>> {
        if slot.is_null() {
            *slot = self.default.clone();
        }
        match slot {
            Value::Object(map) => Ok(map),
            other => Err(DbError::TypeMismatch {
                owner: self.owner.clone(),
                key: self.key.clone(),
                current: kind_name(other),
                requested: "mapping",
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.read(|map| map.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into().as_stored();
        self.read(|map| map.get(&key).cloned())
    }

    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        let key = key.into().as_stored();
        self.read(|map| map.contains_key(&key))
    }

    pub fn keys(&self) -> Vec<String> {
        self.read(|map| map.keys().cloned().collect())
    }

    pub fn values(&self) -> Vec<Value> {
        self.read(|map| map.values().cloned().collect())
    }

    /// Copy of the whole mapping
    pub fn to_map(&self) -> Map<String, Value> {
        self.read(|map| map.clone())
    }

    /// Store `value` under `key`, returning the previous value
    pub fn insert<V: Serialize>(&self, key: impl Into<Key>, value: V) -> Result<Option<Value>> {
        let key = key.into().as_stored();
        let value = guard::to_value(&value, "value")?;
        self.modify(|map| Ok(map.insert(key, value)))
    }

    pub fn remove(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let key = key.into().as_stored();
        self.modify(|map| Ok(map.remove(&key)))
    }

    pub fn clear(&self) -> Result<()> {
        self.modify(|map| {
            map.clear();
            Ok(())
        })
    }

    /// Insert every pair; nothing is stored if any value is invalid
    pub fn extend<I, K, V>(&self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Serialize,
    {
        let pairs = pairs
            .into_iter()
            .map(|(k, v)| -> Result<(String, Value)> {
                Ok((k.into().as_stored(), guard::to_value(&v, "value")?))
            })
            .collect::<Result<Vec<_>>>()?;
        self.modify(|map| {
            map.extend(pairs);
            Ok(())
        })
    }

    pub fn retain(&self, mut keep: impl FnMut(&str, &Value) -> bool) -> Result<()> {
        self.modify_detached(|map| {
            map.retain(|k, v| keep(k, v));
            Ok(())
        })
    }

    /// Arbitrary edit of a copy that replaces the mapping, followed by a save
    pub fn update<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> Result<R> {
        self.modify_detached(|map| Ok(f(map)))
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig, DbError};
    use serde_json::json;

    fn db() -> Database {
        Database::new(DbConfig::new("1").with_revision_interval_secs(0))
    }

    #[test]
    fn test_insert_and_get() {
        let db = db();
        let map = db.map_pointer("mod", "users").unwrap();
        assert!(map.insert("alice", 1).unwrap().is_none());
        assert_eq!(map.insert("alice", 2).unwrap(), Some(json!(1)));
        map.insert(42, "answer").unwrap();

        assert_eq!(map.get("alice"), Some(json!(2)));
        assert!(map.contains_key(42));
        assert_eq!(db.get_value("mod", "users"), Some(json!({"alice": 2, "42": "answer"})));
    }

    #[test]
    fn test_remove_and_clear() {
        let db = db();
        let map = db.map_pointer("mod", "users").unwrap();
        map.extend([("a", 1), ("b", 2)]).unwrap();
        assert_eq!(map.len(), 2);

        assert_eq!(map.remove("a").unwrap(), Some(json!(1)));
        assert_eq!(map.remove("a").unwrap(), None);
        assert_eq!(map.keys(), vec!["b".to_string()]);

        map.clear().unwrap();
        assert!(map.is_empty());
        assert_eq!(db.get_value("mod", "users"), Some(json!({})));
    }

    #[test]
    fn test_retain_and_update() {
        let db = db();
        let map = db.map_pointer("mod", "scores").unwrap();
        map.extend([("a", 1), ("b", 5), ("c", 9)]).unwrap();

        map.retain(|_, v| v.as_i64().unwrap_or(0) > 2).unwrap();
        assert_eq!(map.keys(), vec!["b".to_string(), "c".to_string()]);

        let total = map
            .update(|m| m.values().filter_map(|v| v.as_i64()).sum::<i64>())
            .unwrap();
        assert_eq!(total, 14);
    }

    #[test]
    fn test_retain_can_read_the_database() {
        let db = db();
        let map = db.map_pointer("mod", "scores").unwrap();
        map.extend([("a", 1), ("b", 5)]).unwrap();
        db.set("mod", "banned", vec!["b"]).unwrap();

        map.retain(|k, _| !db.get("mod", "banned", Vec::<String>::new()).contains(&k.to_string()))
            .unwrap();
        assert_eq!(map.keys(), vec!["a".to_string()]);

        map.update(|m| {
            let extra = map.len();
            m.insert("count".to_string(), json!(extra));
        })
        .unwrap();
        assert_eq!(map.get("count"), Some(json!(1)));
    }

    #[test]
    fn test_mutation_after_type_change_fails() {
        let db = db();
        let map = db.map_pointer("mod", "users").unwrap();
        db.set("mod", "users", vec![1]).unwrap();

        assert!(matches!(
            map.insert("a", 1),
            Err(DbError::TypeMismatch { current: "list", requested: "mapping", .. })
        ));
        assert!(map.is_empty());
    }
}

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::TypedList;
use crate::guard::{self, kind_name};
use crate::{Database, DbError, Result};

/// Live list at `(owner, key)`
#[derive(Debug, Clone)]
pub struct ListPointer {
    db: Database,
    owner: String,
    key: String,
    default: Value,
}

impl ListPointer {
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

    /// Items converted to and from `T`
    pub fn typed<T>(self) -> TypedList<T>
    where
        T: Serialize + DeserializeOwned,
    {
        TypedList::new(self)
    }

    fn read<R>(&self, f: impl FnOnce(&[Value]) -> R) -> R {
        self.db
            .with_slot(&self.owner, &self.key, &self.default, |slot| match slot {
                Value::Array(items) => f(items),
                Value::Null => f(self.default.as_array().map(Vec::as_slice).unwrap_or(&[])),
                other => {
                    tracing::warn!(
                        "List pointer at {}/{} now holds a {}, reading it as empty",
                        self.owner,
                        self.key,
                        kind_name(other)
                    );
                    f(&[])
                }
            })
    }

    /// Edit the stored list in place and save; nothing is saved when `f` fails
    pub(crate) fn modify<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> Result<R>) -> Result<R> {
        self.db
            .modify_slot(&self.owner, &self.key, &self.default, |slot| {
                f(self.as_list(slot)?)
            })
    }

    /// Like [`ListPointer::modify`], but `f` runs on a copy with no lock held,
    /// so it may read the database itself
    pub(crate) fn modify_detached<R>(
        &self,
        f: impl FnOnce(&mut Vec<Value>) -> Result<R>,
    ) -> Result<R> {
        self.db
            .modify_slot_detached(&self.owner, &self.key, &self.default, |slot| {
                f(self.as_list(slot)?)
            })
    }

    fn as_list<'a>(&self, slot: &'a mut Value) -> Result<&'a mut Vec<Value>> {
        if slot.is_null() {
            *slot = self.default.clone();
        }
        match slot {
            Value::Array(items) => Ok(items),
            other => Err(DbError::TypeMismatch {
                owner: self.owner.clone(),
                key: self.key.clone(),
                current: kind_name(other),
                requested: "list",
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.read(|items| items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.read(|items| items.get(index).cloned())
    }

    pub fn first(&self) -> Option<Value> {
        self.read(|items| items.first().cloned())
    }

    pub fn last(&self) -> Option<Value> {
        self.read(|items| items.last().cloned())
    }

    /// Copy of the whole list
    pub fn to_vec(&self) -> Vec<Value> {
        self.read(|items| items.to_vec())
    }

    pub fn contains<V: Serialize>(&self, value: V) -> bool {
        self.position(value).is_some()
    }

    pub fn position<V: Serialize>(&self, value: V) -> Option<usize> {
        let needle = serde_json::to_value(value).ok()?;
        self.read(|items| items.iter().position(|item| *item == needle))
    }

    pub fn push<V: Serialize>(&self, value: V) -> Result<()> {
        let value = guard::to_value(&value, "value")?;
        self.modify(|items| {
            items.push(value);
            Ok(())
        })
    }

    /// Insert at `index`; `index == len` appends
    pub fn insert<V: Serialize>(&self, index: usize, value: V) -> Result<()> {
        let value = guard::to_value(&value, "value")?;
        self.modify(|items| {
            if index > items.len() {
                return Err(DbError::IndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, value);
            Ok(())
        })
    }

    /// Append every value; nothing is stored if any of them is invalid
    pub fn extend<I, V>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Serialize,
    {
        let values = values
            .into_iter()
            .map(|v| guard::to_value(&v, "value"))
            .collect::<Result<Vec<_>>>()?;
        self.modify(|items| {
            items.extend(values);
            Ok(())
        })
    }

    /// Replace the item at `index`, returning the old one
    pub fn set<V: Serialize>(&self, index: usize, value: V) -> Result<Value> {
        let value = guard::to_value(&value, "value")?;
        self.modify(|items| {
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(DbError::IndexOutOfRange { index, len })?;
            Ok(std::mem::replace(slot, value))
        })
    }

    pub fn remove(&self, index: usize) -> Result<Value> {
        self.modify(|items| {
            if index >= items.len() {
                return Err(DbError::IndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
            Ok(items.remove(index))
        })
    }

    /// Remove the first item equal to `value`; returns whether one was found
    pub fn remove_item<V: Serialize>(&self, value: V) -> Result<bool> {
        let needle = guard::to_value(&value, "value")?;
        self.modify(|items| match items.iter().position(|item| *item == needle) {
            Some(index) => {
                items.remove(index);
                Ok(true)
            }
            None => Ok(false),
        })
    }

    pub fn pop(&self) -> Result<Option<Value>> {
        self.modify(|items| Ok(items.pop()))
    }

    pub fn clear(&self) -> Result<()> {
        self.modify(|items| {
            items.clear();
            Ok(())
        })
    }

    /// Keep only the items `keep` accepts. `keep` may read the database.
    pub fn retain(&self, mut keep: impl FnMut(&Value) -> bool) -> Result<()> {
        self.modify_detached(|items| {
            items.retain(|item| keep(item));
            Ok(())
        })
    }

    /// Arbitrary edit of a copy that replaces the list afterwards. Values that
    /// break the store are rolled back by the save that follows.
    pub fn update<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> Result<R> {
        self.modify_detached(|items| Ok(f(items)))
    }
}

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use super::{decode, ListPointer, MapPointer};
use crate::guard;
use crate::store::Key;
use crate::{DbError, Result};

/// List pointer that converts items to and from `T`.
///
/// Items are stored in their serialized form; a stored item that doesn't
/// decode as `T` is reported as [`DbError::ItemConversion`] and left in place.
pub struct TypedList<T> {
    inner: ListPointer,
    _item: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedList<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _item: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TypedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedList")
            .field("owner", &self.inner.owner())
            .field("key", &self.inner.key())
            .field("item", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> TypedList<T>
where
    T: Serialize + DeserializeOwned,
{
    pub(crate) fn new(inner: ListPointer) -> Self {
        Self {
            inner,
            _item: PhantomData,
        }
    }

    /// The untyped view of the same list
    pub fn raw(&self) -> &ListPointer {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Option<T>> {
        self.inner.get(index).map(decode::<T>).transpose()
    }

    pub fn to_vec(&self) -> Result<Vec<T>> {
        self.inner.to_vec().into_iter().map(decode::<T>).collect()
    }

    pub fn push(&self, item: &T) -> Result<()> {
        self.inner.push(guard::to_value(item, "item")?)
    }

    pub fn insert(&self, index: usize, item: &T) -> Result<()> {
        self.inner.insert(index, guard::to_value(item, "item")?)
    }

    pub fn extend<'a, I>(&self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let values = items
            .into_iter()
            .map(|item| guard::to_value(item, "item"))
            .collect::<Result<Vec<_>>>()?;
        self.inner.extend(values)
    }

    /// Replace the item at `index`, returning the old one
    pub fn set(&self, index: usize, item: &T) -> Result<T> {
        let value = guard::to_value(item, "item")?;
        self.inner.modify(|items| {
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(DbError::IndexOutOfRange { index, len })?;
            let old = decode(slot.clone())?;
            *slot = value;
            Ok(old)
        })
    }

    pub fn remove(&self, index: usize) -> Result<T> {
        self.inner.modify(|items| {
            let len = items.len();
            let item = decode(
                items
                    .get(index)
                    .cloned()
                    .ok_or(DbError::IndexOutOfRange { index, len })?,
            )?;
            items.remove(index);
            Ok(item)
        })
    }

    pub fn pop(&self) -> Result<Option<T>> {
        self.inner.modify(|items| match items.last().cloned() {
            Some(last) => {
                let item = decode(last)?;
                items.pop();
                Ok(Some(item))
            }
            None => Ok(None),
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    /// Edit the decoded items and store them back.
    ///
    /// The list is left alone when a stored item doesn't decode as `T` or an
    /// edited one doesn't encode.
    pub fn update<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> Result<R> {
        self.inner.modify_detached(|items| {
            let mut decoded = items
                .iter()
                .cloned()
                .map(decode::<T>)
                .collect::<Result<Vec<_>>>()?;
            let out = f(&mut decoded);
            *items = decoded
                .iter()
                .map(|item| guard::to_value(item, "item"))
                .collect::<Result<Vec<_>>>()?;
            Ok(out)
        })
    }

    pub fn retain(&self, mut keep: impl FnMut(&T) -> bool) -> Result<()> {
        self.update(|items| items.retain(|item| keep(item)))
    }
}

/// Mapping pointer that converts values to and from `T`
pub struct TypedMap<T> {
    inner: MapPointer,
    _item: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedMap<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _item: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TypedMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedMap")
            .field("owner", &self.inner.owner())
            .field("key", &self.inner.key())
            .field("item", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> TypedMap<T>
where
    T: Serialize + DeserializeOwned,
{
    pub(crate) fn new(inner: MapPointer) -> Self {
        Self {
            inner,
            _item: PhantomData,
        }
    }

    pub fn raw(&self) -> &MapPointer {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        self.inner.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }

    pub fn get(&self, key: impl Into<Key>) -> Result<Option<T>> {
        self.inner.get(key).map(decode::<T>).transpose()
    }

    /// Every entry decoded, in key order
    pub fn entries(&self) -> Result<Vec<(String, T)>> {
        self.inner
            .to_map()
            .into_iter()
            .map(|(k, v)| -> Result<(String, T)> { Ok((k, decode(v)?)) })
            .collect()
    }

    pub fn insert(&self, key: impl Into<Key>, item: &T) -> Result<()> {
        let value = guard::to_value(item, "item")?;
        self.inner.insert(key, value).map(|_| ())
    }

    /// Remove the entry under `key`, returning it decoded
    pub fn remove(&self, key: impl Into<Key>) -> Result<Option<T>> {
        let key = key.into().as_stored();
        self.inner.modify(|map| match map.get(&key).cloned() {
            Some(value) => {
                let item = decode(value)?;
                map.remove(&key);
                Ok(Some(item))
            }
            None => Ok(None),
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    /// Edit the decoded entries and store them back; nothing changes when an
    /// entry fails to convert either way
    pub fn update<R>(&self, f: impl FnOnce(&mut BTreeMap<String, T>) -> R) -> Result<R> {
        self.inner.modify_detached(|map| {
            let mut decoded = map
                .iter()
                .map(|(k, v)| -> Result<(String, T)> { Ok((k.clone(), decode(v.clone())?)) })
                .collect::<Result<BTreeMap<_, _>>>()?;
            let out = f(&mut decoded);
            *map = decoded
                .iter()
                .map(|(k, item)| -> Result<(String, serde_json::Value)> {
                    Ok((k.clone(), guard::to_value(item, "item")?))
                })
                .collect::<Result<_>>()?;
            Ok(out)
        })
    }

    pub fn retain(&self, mut keep: impl FnMut(&str, &T) -> bool) -> Result<()> {
        self.update(|map| map.retain(|k, item| keep(k, item)))
    }
}

//! Live views onto a single `(owner, key)` coordinate
//!
//! A pointer never caches the value. Every read goes to the store, every
//! mutation is validated, applied in place and followed by a save.

mod list;
mod map;
mod typed;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use self::list::ListPointer;
pub use self::map::MapPointer;
pub use self::typed::{TypedList, TypedMap};

use crate::{DbError, Result};

/// What [`crate::Database::pointer`] hands back, decided by the default's shape
#[derive(Debug, Clone)]
pub enum Pointer {
    List(ListPointer),
    Map(MapPointer),
    /// Scalars have no live view; this is the current value
    Scalar(Value),
}

impl Pointer {
    pub fn into_list(self) -> Option<ListPointer> {
        match self {
            Pointer::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<MapPointer> {
        match self {
            Pointer::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Pointer::Scalar(value) => Some(value),
            _ => None,
        }
    }
}

/// Pointer whose items are converted to and from `T`
#[derive(Debug, Clone)]
pub enum TypedPointer<T> {
    List(TypedList<T>),
    Map(TypedMap<T>),
}

impl<T> TypedPointer<T> {
    pub fn into_list(self) -> Option<TypedList<T>> {
        match self {
            TypedPointer::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<TypedMap<T>> {
        match self {
            TypedPointer::Map(map) => Some(map),
            _ => None,
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| DbError::ItemConversion(e.to_string()))
}

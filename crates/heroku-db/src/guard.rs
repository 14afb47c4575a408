//! Serialization guard
//!
//! Decides whether values fit the wire format and repairs stores whose shape
//! drifted away from owner → namespace → key → value.

use serde::Serialize;
use serde_json::Value;

use crate::store::Store;
use crate::{DbError, Result};

/// Deepest nesting the JSON reader accepts for a whole document
pub const MAX_DOCUMENT_DEPTH: usize = 127;

/// Deepest nesting allowed for a single stored value: the document root and
/// the owner namespace take two levels.
pub const MAX_VALUE_DEPTH: usize = MAX_DOCUMENT_DEPTH - 2;

/// Outcome of checking or repairing a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixReport {
    /// Every owner is a mapping and every value fits the wire format
    Clean,
    /// Broken owner entries had to be dropped
    Repaired { dropped: Vec<String> },
    /// Some value can't be written and read back; dropping keys won't help
    Unrepairable,
}

impl FixReport {
    pub fn is_clean(&self) -> bool {
        matches!(self, FixReport::Clean)
    }

    /// True unless the structure itself is beyond repair
    pub fn is_usable(&self) -> bool {
        !matches!(self, FixReport::Unrepairable)
    }
}

/// Name of a value's JSON type
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// Nesting depth of a value; scalars are 0
pub fn depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Whether a value can be written to the store and read back
pub fn is_serializable(value: &Value) -> bool {
    depth(value) <= MAX_VALUE_DEPTH
}

/// Convert an argument into a storable value.
///
/// `argument` names the offending parameter in the error.
pub fn to_value<T>(value: &T, argument: &'static str) -> Result<Value>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value)
        .map_err(|e| DbError::validation(argument, e.to_string()))?;
    if !is_serializable(&value) {
        return Err(DbError::validation(
            argument,
            format!("nested deeper than {} levels", MAX_VALUE_DEPTH),
        ));
    }
    Ok(value)
}

/// Owners name namespaces and must not be empty
pub fn validate_owner(owner: &str) -> Result<()> {
    if owner.is_empty() {
        return Err(DbError::validation("owner", "owner name is empty"));
    }
    Ok(())
}

/// Check a store without touching it
pub fn inspect(store: &Store) -> FixReport {
    let mut dropped = Vec::new();
    for (owner, value) in store.entries() {
        match value {
            Value::Object(ns) => {
                if ns.values().any(|v| !is_serializable(v)) {
                    return FixReport::Unrepairable;
                }
            }
            _ => dropped.push(owner.clone()),
        }
    }
    if dropped.is_empty() {
        FixReport::Clean
    } else {
        FixReport::Repaired { dropped }
    }
}

/// Repair a store in place.
///
/// A clean store is left untouched. Owners whose value is not a mapping are
/// dropped with a warning. An unrepairable store is left as it is.
pub fn autofix(store: &mut Store) -> FixReport {
    let report = inspect(store);
    if let FixReport::Repaired { dropped } = &report {
        for owner in dropped {
            if let Some(value) = store.owners_mut().remove(owner) {
                tracing::warn!(
                    "DbAutoFix: Dropped owner {}, because it is not a mapping but {}",
                    owner,
                    kind_name(&value)
                );
            }
        }
    }
    report
}

//! Error types for the database

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Database error type
#[derive(Error, Debug)]
pub enum DbError {
    /// An argument passed to `set`/`pointer` is not representable in the store
    #[error("Invalid {argument}: {reason}")]
    Validation {
        argument: &'static str,
        reason: String,
    },

    /// The store failed the guard and was rolled back to a known-good revision.
    /// The in-memory state has already been repaired when this is returned.
    #[error("Database was broken by the last change and has been restored to the revision taken at {restored_at}")]
    Corrupted { restored_at: DateTime<Utc> },

    /// The store is broken and no clean revision is left to restore it from
    #[error("Database is broken and no clean revision is left to restore it from, saving is forbidden")]
    Unrecoverable,

    #[error("Remote cache connection failed: {0}")]
    BackendConnect(String),

    #[error("Remote cache error: {0}")]
    Remote(String),

    #[error("A backend is already attached to this database")]
    AlreadyInitialized,

    #[error("Can't switch the type of pointer at {owner}/{key} (current: {current}, requested: {requested})")]
    TypeMismatch {
        owner: String,
        key: String,
        current: &'static str,
        requested: &'static str,
    },

    #[error("Pointer for {0} values is not implemented")]
    PointerNotImplemented(&'static str),

    #[error("Index {index} is out of range for a list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Failed to convert stored item: {0}")]
    ItemConversion(String),

    #[error("Tried to use assets before an assets channel was configured")]
    NoAssetsChannel,

    #[error("Asset transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    pub(crate) fn validation(argument: &'static str, reason: impl Into<String>) -> Self {
        DbError::Validation {
            argument,
            reason: reason.into(),
        }
    }

    /// True when the owning process must stop instead of running on unknown state
    pub fn is_fatal(&self) -> bool {
        matches!(self, DbError::Unrecoverable)
    }
}

impl From<redis::RedisError> for DbError {
    fn from(e: redis::RedisError) -> Self {
        DbError::Remote(e.to_string())
    }
}

/// Result type for database operations
pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_names_argument() {
        let err = DbError::validation("value", "not a JSON value");
        assert!(err.to_string().contains("Invalid value"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_only_unrecoverable_is_fatal() {
        assert!(DbError::Unrecoverable.is_fatal());
        assert!(!DbError::Corrupted { restored_at: Utc::now() }.is_fatal());
        assert!(!DbError::BackendConnect("refused".into()).is_fatal());
    }
}

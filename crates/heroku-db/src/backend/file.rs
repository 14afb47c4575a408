//! Local JSON file backend

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::store::Store;
use crate::Result;

/// Key prefix written by releases that predate the rename
pub const LEGACY_KEY_PREFIX: &str = "hikka.";

/// Key prefix used by current releases
pub const CURRENT_KEY_PREFIX: &str = "heroku.";

lazy_static! {
    static ref LEGACY_KEY: Regex = Regex::new(r#"hikka\.(\S+":)"#).unwrap();
}

/// Rewrite legacy key prefixes in a raw document.
///
/// Returns `None` when the document has nothing to migrate.
pub fn migrate_legacy_keys(text: &str) -> Option<String> {
    if !LEGACY_KEY.is_match(text) {
        return None;
    }
    let replacement = format!("{}${{1}}", CURRENT_KEY_PREFIX);
    Some(LEGACY_KEY.replace_all(text, replacement.as_str()).into_owned())
}

/// Serialize a store the way it is kept on disk: 4-space indented JSON
pub fn to_pretty_json(store: &Store) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    store.serialize(&mut serializer)?;
    // serde_json only ever emits UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// JSON document on local disk, one per identity
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the store from disk.
    ///
    /// A missing, unreadable or unparsable file yields an empty store.
    pub fn read(&self) -> Store {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(
                    "Database file {} not found, creating new one...",
                    self.path.display()
                );
                return Store::new();
            }
            Err(e) => {
                tracing::warn!(
                    "Database read from {} failed ({}), creating new one...",
                    self.path.display(),
                    e
                );
                return Store::new();
            }
        };

        let text = match migrate_legacy_keys(&text) {
            Some(migrated) => {
                tracing::warn!(
                    "Converting db after update: {} keys renamed to {}",
                    LEGACY_KEY_PREFIX,
                    CURRENT_KEY_PREFIX
                );
                migrated
            }
            None => text,
        };

        match serde_json::from_str::<Store>(&text) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!("Database read failed ({}), creating new one...", e);
                Store::new()
            }
        }
    }

    /// Write the whole store, replacing the file atomically
    pub fn write(&self, store: &Store) -> Result<()> {
        let content = to_pretty_json(store)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

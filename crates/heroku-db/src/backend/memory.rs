//! In-process remote cache

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::RemoteCache;
use crate::Result;

/// Remote cache kept in memory.
///
/// Clones share the same contents, so a test can keep one handle while the
/// database owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    blobs: Arc<RwLock<HashMap<String, String>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob without counting it as a write
    pub fn with_blob(self, key: impl Into<String>, blob: impl Into<String>) -> Self {
        self.blobs.write().insert(key.into(), blob.into());
        self
    }

    /// Blob currently stored under `key`
    pub fn blob(&self, key: &str) -> Option<String> {
        self.blobs.read().get(key).cloned()
    }

    /// Number of `store` calls served
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteCache for MemoryCache {
    async fn fetch(&self, key: &str) -> Result<Option<String>> {
        Ok(self.blob(key))
    }

    async fn store(&self, key: &str, blob: String) -> Result<()> {
        self.blobs.write().insert(key.to_string(), blob);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_fetch() {
        let cache = MemoryCache::new();
        assert!(cache.fetch("1").await.unwrap().is_none());

        cache.store("1", "{}".to_string()).await.unwrap();
        assert_eq!(cache.fetch("1").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(cache.writes(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_contents() {
        let cache = MemoryCache::new().with_blob("7", "{\"a\": {}}");
        let other = cache.clone();
        other.store("8", "{}".to_string()).await.unwrap();

        assert_eq!(cache.writes(), 1);
        assert!(cache.blob("8").is_some());
        assert_eq!(other.blob("7").as_deref(), Some("{\"a\": {}}"));
    }
}

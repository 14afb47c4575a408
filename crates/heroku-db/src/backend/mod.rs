//! Storage backends
//!
//! A database persists through exactly one backend for its whole lifetime:
//!
//! - [`FileBackend`]: pretty-printed JSON document on local disk
//! - [`RemoteBackend`]: one JSON blob in a remote key/value cache, written by
//!   a debounced background flush

pub mod file;
pub mod memory;
pub mod redis_cache;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::{DbError, Result};

pub use self::file::FileBackend;
pub use self::memory::MemoryCache;
pub use self::redis_cache::RedisCache;

/// Remote key/value cache holding the serialized store
#[async_trait]
pub trait RemoteCache: Send + Sync + fmt::Debug {
    /// Fetch the blob stored under `key`
    async fn fetch(&self, key: &str) -> Result<Option<String>>;

    /// Replace the blob stored under `key`
    async fn store(&self, key: &str, blob: String) -> Result<()>;
}

/// Remote cache together with the runtime its deferred flushes run on
#[derive(Clone)]
pub struct RemoteBackend {
    cache: Arc<dyn RemoteCache>,
    runtime: Handle,
}

impl fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("cache", &self.cache)
            .finish()
    }
}

impl RemoteBackend {
    /// Bind a cache to the current tokio runtime
    pub fn new(cache: Arc<dyn RemoteCache>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            DbError::Remote(format!("remote backend needs a tokio runtime: {}", e))
        })?;
        Ok(Self { cache, runtime })
    }

    pub fn cache(&self) -> &Arc<dyn RemoteCache> {
        &self.cache
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }
}

/// The active persistence target
#[derive(Debug, Clone)]
pub enum Backend {
    File(FileBackend),
    Remote(RemoteBackend),
}

impl Backend {
    /// Remote backend over any cache implementation
    pub fn remote(cache: impl RemoteCache + 'static) -> Result<Self> {
        Ok(Backend::Remote(RemoteBackend::new(Arc::new(cache))?))
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::File(_) => BackendKind::File,
            Backend::Remote(_) => BackendKind::Remote,
        }
    }
}

/// Which backend a database persists through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    None,
    File,
    Remote,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::None => f.write_str("none"),
            BackendKind::File => f.write_str("file"),
            BackendKind::Remote => f.write_str("remote"),
        }
    }
}

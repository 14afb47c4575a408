//! Database façade
//!
//! [`Database`] owns the store and composes the guard, the revision log, the
//! save scheduler and the active backend. Handles are cheap to clone and all
//! clones share one store.

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::assets::{AssetStore, AssetTransport};
use crate::backend::{Backend, BackendKind, FileBackend, RedisCache, RemoteBackend, RemoteCache};
use crate::config::{ConfigSource, DbConfig, REDIS_URI_KEY};
use crate::guard::{self, kind_name};
use crate::pointer::{ListPointer, MapPointer, Pointer, TypedList, TypedMap, TypedPointer};
use crate::revision::RevisionLog;
use crate::scheduler::FlushScheduler;
use crate::store::{Key, Store};
use crate::{DbError, Result};

struct Shared {
    config: DbConfig,
    store: RwLock<Store>,
    revisions: Mutex<RevisionLog>,
    backend: OnceLock<Backend>,
    scheduler: FlushScheduler,
    /// Set once an unrepairable store had no revision to restore; saving is
    /// refused from then on
    broken: AtomicBool,
}

impl Shared {
    fn serialize_store(&self) -> Result<String> {
        let store = self.store.read();
        Ok(serde_json::to_string(&*store)?)
    }

    async fn flush_remote(&self, cache: &dyn RemoteCache) -> bool {
        let blob = match self.serialize_store() {
            Ok(blob) => blob,
            Err(e) => {
                tracing::error!("Remote database save failed: {}", e);
                return false;
            }
        };

        match cache.store(&self.config.identity, blob).await {
            Ok(()) => {
                tracing::debug!("Database flushed to remote cache");
                true
            }
            Err(e) => {
                tracing::error!("Remote database save failed: {}", e);
                false
            }
        }
    }
}

/// Namespaced key/value database
#[derive(Clone)]
pub struct Database {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("identity", &self.shared.config.identity)
            .field("backend", &self.backend_kind())
            .field("owners", &self.shared.store.read().len())
            .finish()
    }
}

impl Database {
    /// Create an empty database with no backend attached
    pub fn new(config: DbConfig) -> Self {
        let revisions = RevisionLog::new(config.revision_capacity, config.revision_interval());
        let scheduler = FlushScheduler::new(config.flush_delay());
        Self {
            shared: Arc::new(Shared {
                config,
                store: RwLock::new(Store::new()),
                revisions: Mutex::new(revisions),
                backend: OnceLock::new(),
                scheduler,
                broken: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &DbConfig {
        &self.shared.config
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Pick the backend and load the store from it.
    ///
    /// A remote cache URI (explicit in the config, or `redis_uri` from the
    /// host) selects the remote backend; a failed connection falls back to the
    /// local file.
    pub async fn init(&self, source: &dyn ConfigSource) -> Result<BackendKind> {
        let uri = self
            .shared
            .config
            .redis_url
            .clone()
            .or_else(|| source.get_config_key(REDIS_URI_KEY))
            .filter(|uri| !uri.trim().is_empty());

        let backend = match uri {
            Some(uri) => match RedisCache::connect(&uri).await {
                Ok(cache) => Backend::remote(cache)?,
                Err(e) => {
                    tracing::warn!("Remote cache unavailable ({}), falling back to local file", e);
                    self.file_backend()
                }
            },
            None => self.file_backend(),
        };

        let kind = backend.kind();
        self.attach(backend).await?;
        Ok(kind)
    }

    /// Bind a backend and load the store from it.
    ///
    /// A database keeps its backend for life; a second call fails.
    pub async fn attach(&self, backend: Backend) -> Result<()> {
        let kind = backend.kind();
        self.shared
            .backend
            .set(backend)
            .map_err(|_| DbError::AlreadyInitialized)?;
        tracing::info!(
            "Database {} persists through the {} backend",
            self.shared.config.identity,
            kind
        );
        self.read().await;
        Ok(())
    }

    /// Replace the store with what the backend holds.
    ///
    /// Never fails: unreadable data yields an empty store.
    pub async fn read(&self) {
        let mut loaded = match self.shared.backend.get() {
            None => return,
            Some(Backend::File(file)) => file.read(),
            Some(Backend::Remote(remote)) => self.read_remote(remote).await,
        };

        if !guard::autofix(&mut loaded).is_usable() {
            tracing::error!("Loaded database can't be repaired, starting with an empty one");
            loaded = Store::new();
        }

        tracing::debug!("Database loaded with {} owners", loaded.len());
        *self.shared.store.write() = loaded;
    }

    async fn read_remote(&self, remote: &RemoteBackend) -> Store {
        let identity = &self.shared.config.identity;
        match remote.cache().fetch(identity).await {
            Ok(Some(blob)) => match serde_json::from_str::<Store>(&blob) {
                Ok(store) => store,
                Err(e) => {
                    tracing::warn!("Remote database is not valid JSON ({}), starting empty", e);
                    Store::new()
                }
            },
            Ok(None) => Store::new(),
            Err(e) => {
                tracing::error!("Remote database read failed: {}", e);
                Store::new()
            }
        }
    }

    fn file_backend(&self) -> Backend {
        Backend::File(FileBackend::new(self.shared.config.db_path()))
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.shared
            .backend
            .get()
            .map(Backend::kind)
            .unwrap_or(BackendKind::None)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Saving
    // ─────────────────────────────────────────────────────────────────────

    /// Persist the store.
    ///
    /// A store that fails the guard is rolled back to the newest clean
    /// revision and [`DbError::Corrupted`] is returned. With no clean revision
    /// left, broken owners are dropped and the save goes on; only a store that
    /// can't be repaired that way yields [`DbError::Unrecoverable`], after
    /// which every later save is refused. The remote backend only schedules a
    /// debounced flush and returns `true` right away. A failed file write is
    /// logged and reported as `false`.
    pub fn save(&self) -> Result<bool> {
        self.prepare_save()?;
        match self.shared.backend.get() {
            None => Ok(true),
            Some(Backend::File(file)) => Ok(self.write_file(file)),
            Some(Backend::Remote(remote)) => {
                let shared = Arc::clone(&self.shared);
                let cache = Arc::clone(remote.cache());
                self.shared
                    .scheduler
                    .schedule(remote.runtime(), move || async move {
                        shared.flush_remote(cache.as_ref()).await;
                    });
                Ok(true)
            }
        }
    }

    /// Like [`Database::save`], but writes right away and waits for the
    /// remote write to finish
    pub async fn force_save(&self) -> Result<bool> {
        self.prepare_save()?;
        match self.shared.backend.get() {
            None => Ok(true),
            Some(Backend::File(file)) => Ok(self.write_file(file)),
            Some(Backend::Remote(remote)) => {
                Ok(self.shared.flush_remote(remote.cache().as_ref()).await)
            }
        }
    }

    /// Guard check, rollback on failure, then revision snapshot
    fn prepare_save(&self) -> Result<()> {
        if self.shared.broken.load(Ordering::Acquire) {
            return Err(DbError::Unrecoverable);
        }

        let mut store = self.shared.store.write();
        let mut revisions = self.shared.revisions.lock();

        let report = guard::inspect(&store);
        if !report.is_clean() {
            tracing::error!("Database failed the integrity check ({:?}), rolling back", report);
            match revisions.recover() {
                Some(revision) => {
                    let restored_at = revision.taken_at;
                    *store = revision.into_store();
                    return Err(DbError::Corrupted { restored_at });
                }
                // No revision to go back to, but dropping broken owners is enough
                None if report.is_usable() => {
                    guard::autofix(&mut store);
                    tracing::warn!("No revision to restore from, saving the repaired database");
                }
                None => {
                    self.shared.broken.store(true, Ordering::Release);
                    tracing::error!(
                        "Can't find revision to restore broken database from, saving is forbidden"
                    );
                    return Err(DbError::Unrecoverable);
                }
            }
        }

        revisions.maybe_snapshot(&store, Instant::now());
        Ok(())
    }

    fn write_file(&self, file: &FileBackend) -> bool {
        let store = self.shared.store.read();
        match file.write(&store) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Database save to {} failed: {}", file.path().display(), e);
                false
            }
        }
    }

    /// Whether a debounced remote flush is waiting to run
    pub fn flush_pending(&self) -> bool {
        self.shared.scheduler.is_pending()
    }

    /// True once recovery ran out of revisions
    pub fn is_broken(&self) -> bool {
        self.shared.broken.load(Ordering::Acquire)
    }

    pub fn revision_count(&self) -> usize {
        self.shared.revisions.lock().len()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads and writes
    // ─────────────────────────────────────────────────────────────────────

    /// Value at `(owner, key)` decoded as `T`, or `default` when absent or of
    /// another shape
    pub fn get<T>(&self, owner: &str, key: impl Into<Key>, default: T) -> T
    where
        T: DeserializeOwned,
    {
        let key = key.into().as_stored();
        let store = self.shared.store.read();
        match store.get(owner, &key) {
            Some(value) => <T as Deserialize>::deserialize(value).unwrap_or_else(|e| {
                tracing::debug!("Value at {}/{} doesn't decode as requested: {}", owner, key, e);
                default
            }),
            None => default,
        }
    }

    /// Raw value at `(owner, key)`
    pub fn get_value(&self, owner: &str, key: impl Into<Key>) -> Option<Value> {
        let key = key.into().as_stored();
        self.shared.store.read().get(owner, &key).cloned()
    }

    /// Validate and store a value, then save.
    ///
    /// Invalid arguments are rejected before the store is touched.
    pub fn set<V>(&self, owner: &str, key: impl Into<Key>, value: V) -> Result<bool>
    where
        V: Serialize,
    {
        guard::validate_owner(owner)?;
        let key = key.into().as_stored();
        let value = guard::to_value(&value, "value")?;

        self.shared.store.write().insert(owner, &key, value);
        self.save()
    }

    /// Copy of an owner's namespace
    pub fn namespace(&self, owner: &str) -> Option<Map<String, Value>> {
        self.shared.store.read().namespace(owner).cloned()
    }

    pub fn owners(&self) -> Vec<String> {
        self.shared.store.read().owners().cloned().collect()
    }

    /// Read-only copy of the whole store
    pub fn snapshot(&self) -> Store {
        self.shared.store.read().clone()
    }

    /// Apply a bulk edit to the raw store, then save.
    ///
    /// The edit runs on a copy with no lock held, so it may read the database
    /// itself. The copy replaces the store afterwards; anything the edit
    /// breaks is rolled back by the save.
    pub fn edit<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&mut Store),
    {
        let mut draft = self.snapshot();
        f(&mut draft);
        *self.shared.store.write() = draft;
        self.save()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pointers
    // ─────────────────────────────────────────────────────────────────────

    /// Live view of `(owner, key)` shaped after `default`.
    ///
    /// Lists and mappings get a live pointer; scalars are returned as they
    /// are. An existing value of another type is a [`DbError::TypeMismatch`];
    /// an absent or null value never is.
    pub fn pointer<D>(&self, owner: &str, key: impl Into<Key>, default: D) -> Result<Pointer>
    where
        D: Serialize,
    {
        let (key, default) = self.resolve_pointer(owner, key.into(), &default)?;
        Ok(match default {
            default @ Value::Array(_) => {
                Pointer::List(ListPointer::new(self.clone(), owner, key, default))
            }
            default @ Value::Object(_) => {
                Pointer::Map(MapPointer::new(self.clone(), owner, key, default))
            }
            default => {
                let value = self
                    .get_value(owner, key.as_str())
                    .filter(|v| !v.is_null())
                    .unwrap_or(default);
                Pointer::Scalar(value)
            }
        })
    }

    /// List pointer with an empty default
    pub fn list_pointer(&self, owner: &str, key: impl Into<Key>) -> Result<ListPointer> {
        let default = Value::Array(Vec::new());
        let (key, default) = self.resolve_pointer(owner, key.into(), &default)?;
        Ok(ListPointer::new(self.clone(), owner, key, default))
    }

    /// Mapping pointer with an empty default
    pub fn map_pointer(&self, owner: &str, key: impl Into<Key>) -> Result<MapPointer> {
        let default = Value::Object(Map::new());
        let (key, default) = self.resolve_pointer(owner, key.into(), &default)?;
        Ok(MapPointer::new(self.clone(), owner, key, default))
    }

    /// Pointer whose items are converted to and from `T`
    pub fn typed_pointer<T, D>(
        &self,
        owner: &str,
        key: impl Into<Key>,
        default: D,
    ) -> Result<TypedPointer<T>>
    where
        T: Serialize + DeserializeOwned,
        D: Serialize,
    {
        match self.pointer(owner, key, default)? {
            Pointer::List(list) => Ok(TypedPointer::List(list.typed())),
            Pointer::Map(map) => Ok(TypedPointer::Map(map.typed())),
            Pointer::Scalar(value) => Err(DbError::PointerNotImplemented(kind_name(&value))),
        }
    }

    pub fn typed_list<T>(&self, owner: &str, key: impl Into<Key>) -> Result<TypedList<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        Ok(self.list_pointer(owner, key)?.typed())
    }

    pub fn typed_map<T>(&self, owner: &str, key: impl Into<Key>) -> Result<TypedMap<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        Ok(self.map_pointer(owner, key)?.typed())
    }

    fn resolve_pointer<D>(&self, owner: &str, key: Key, default: &D) -> Result<(String, Value)>
    where
        D: Serialize + ?Sized,
    {
        guard::validate_owner(owner)?;
        let key = key.as_stored();
        let default = guard::to_value(default, "default")?;

        if let Some(current) = self.get_value(owner, key.as_str()) {
            if !current.is_null() && kind_name(&current) != kind_name(&default) {
                return Err(DbError::TypeMismatch {
                    owner: owner.to_string(),
                    key,
                    current: kind_name(&current),
                    requested: kind_name(&default),
                });
            }
        }
        Ok((key, default))
    }

    /// Run `f` on the value at `(owner, key)`, storing `default` first when
    /// the coordinate is absent
    pub(crate) fn with_slot<R>(
        &self,
        owner: &str,
        key: &str,
        default: &Value,
        f: impl FnOnce(&Value) -> R,
    ) -> R {
        {
            let store = self.shared.store.read();
            if let Some(value) = store.get(owner, key) {
                return f(value);
            }
        }
        let mut store = self.shared.store.write();
        f(store.entry_or_insert(owner, key, default))
    }

    /// Mutate the value at `(owner, key)` in place, then save.
    ///
    /// Nothing is saved when `f` fails.
    pub(crate) fn modify_slot<R>(
        &self,
        owner: &str,
        key: &str,
        default: &Value,
        f: impl FnOnce(&mut Value) -> Result<R>,
    ) -> Result<R> {
        let out = {
            let mut store = self.shared.store.write();
            f(store.entry_or_insert(owner, key, default))?
        };
        self.save()?;
        Ok(out)
    }

    /// Like [`Database::modify_slot`], but `f` runs on a copy of the value
    /// with no lock held. The copy is written back once `f` succeeds.
    pub(crate) fn modify_slot_detached<R>(
        &self,
        owner: &str,
        key: &str,
        default: &Value,
        f: impl FnOnce(&mut Value) -> Result<R>,
    ) -> Result<R> {
        let mut draft = self.with_slot(owner, key, default, |value| value.clone());
        let out = f(&mut draft)?;
        self.shared.store.write().insert(owner, key, draft);
        self.save()?;
        Ok(out)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Assets
    // ─────────────────────────────────────────────────────────────────────

    /// Asset store over the configured assets channel
    pub fn assets<T: AssetTransport>(&self, transport: T) -> AssetStore<T> {
        AssetStore::new(transport, self.shared.config.assets_channel)
    }
}

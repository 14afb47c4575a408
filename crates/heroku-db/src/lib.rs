//! Heroku DB - Persistent Namespaced Key/Value Store
//!
//! Every module of the userbot keeps its settings and state here, under its
//! own namespace. The whole store is one JSON document.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Database                          │
//! ├──────────────────────────────────────────────────────────┤
//! │   get / set            pointers (list, map, typed)       │
//! │        │                        │                        │
//! │        └───────────┬────────────┘                        │
//! │                    ▼                                     │
//! │      ┌───────────────────────────┐                       │
//! │      │  Store                    │ owner → key → value   │
//! │      └─────────────┬─────────────┘                       │
//! │                    ▼ save                                │
//! │      ┌───────────────────────────┐   broken?             │
//! │      │  Guard                    │ ──────────► rollback  │
//! │      └─────────────┬─────────────┘            (revisions)│
//! │                    ▼ clean                               │
//! │         snapshot to RevisionLog                          │
//! │                    │                                     │
//! │        ┌───────────┴────────────┐                        │
//! │        ▼                        ▼                        │
//! │  ┌───────────┐          ┌──────────────┐                 │
//! │  │ JSON file │          │ Remote cache │ debounced flush │
//! │  └───────────┘          └──────────────┘                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Features
//!
//! - **Namespaces**: values live at `(owner, key)`; owners never collide
//! - **Guard**: unstorable values are rejected before they reach the store
//! - **Rollback**: a broken store is restored from the newest clean revision
//! - **Backends**: local JSON file or a Redis cache with coalesced writes
//! - **Pointers**: live list/mapping views that save on every change

pub mod assets;
pub mod backend;
pub mod config;
pub mod database;
pub mod error;
pub mod guard;
pub mod pointer;
pub mod revision;
pub mod scheduler;
pub mod store;

pub use assets::{AssetStore, AssetTransport};
pub use backend::{Backend, BackendKind, FileBackend, MemoryCache, RedisCache, RemoteCache};
pub use config::{ConfigSource, DbConfig, EnvConfig};
pub use database::Database;
pub use error::{DbError, Result};
pub use guard::FixReport;
pub use pointer::{ListPointer, MapPointer, Pointer, TypedList, TypedMap, TypedPointer};
pub use revision::{Revision, RevisionLog};
pub use store::{Key, Store};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Seconds a remote save waits so that bursts of saves share one write
pub const DEFAULT_FLUSH_DELAY_SECS: u64 = 5;

/// Minimum seconds between two revisions
pub const DEFAULT_REVISION_INTERVAL_SECS: u64 = 3;

/// Revisions kept for rollback
pub const DEFAULT_REVISION_CAPACITY: usize = 15;

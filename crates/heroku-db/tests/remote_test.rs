//! Remote backend tests over the in-memory cache

use heroku_db::{Backend, BackendKind, Database, DbConfig, MemoryCache};
use serde_json::{json, Value};
use std::time::Duration;

fn config() -> DbConfig {
    DbConfig::new(777).with_revision_interval_secs(0)
}

async fn attach(cache: &MemoryCache) -> Database {
    let db = Database::new(config());
    db.attach(Backend::remote(cache.clone()).unwrap())
        .await
        .unwrap();
    db
}

fn stored(cache: &MemoryCache) -> Value {
    serde_json::from_str(&cache.blob("777").unwrap()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_saves_in_window_flush_once() {
    let cache = MemoryCache::new();
    let db = attach(&cache).await;
    assert_eq!(db.backend_kind(), BackendKind::Remote);

    assert!(db.set("mod", "a", 1).unwrap());
    assert!(db.set("mod", "b", 2).unwrap());
    assert!(db.flush_pending());
    assert_eq!(cache.writes(), 0);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(cache.writes(), 1);
    assert!(!db.flush_pending());
    assert_eq!(stored(&cache), json!({"mod": {"a": 1, "b": 2}}));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_saves_from_tasks_flush_once() {
    let cache = MemoryCache::new();
    let db = attach(&cache).await;

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let db = db.clone();
            tokio::spawn(async move { db.set("mod", format!("k{}", i).as_str(), i).unwrap() })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap());
    }
    assert_eq!(cache.writes(), 0);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(cache.writes(), 1);
    let blob = stored(&cache);
    for i in 0..8 {
        assert_eq!(blob["mod"][format!("k{}", i)], json!(i));
    }
}

#[tokio::test(start_paused = true)]
async fn test_save_after_flush_opens_new_window() {
    let cache = MemoryCache::new();
    let db = attach(&cache).await;

    db.set("mod", "a", 1).unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;
    db.set("mod", "a", 2).unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(cache.writes(), 2);
    assert_eq!(stored(&cache), json!({"mod": {"a": 2}}));
}

#[tokio::test(start_paused = true)]
async fn test_flush_writes_latest_state() {
    let cache = MemoryCache::new();
    let db = attach(&cache).await;

    db.set("mod", "a", 1).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    db.set("mod", "a", 5).unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;

    assert_eq!(cache.writes(), 1);
    assert_eq!(stored(&cache), json!({"mod": {"a": 5}}));
}

#[tokio::test]
async fn test_force_save_writes_immediately() {
    let cache = MemoryCache::new();
    let db = attach(&cache).await;

    db.edit(|store| {
        store.insert("mod", "k", json!("v"));
    })
    .unwrap();
    assert!(db.force_save().await.unwrap());
    assert_eq!(cache.writes(), 1);
    assert_eq!(stored(&cache), json!({"mod": {"k": "v"}}));
}

#[tokio::test]
async fn test_read_from_remote() {
    let cache = MemoryCache::new().with_blob("777", r#"{"mod": {"k": 1}}"#);
    let db = attach(&cache).await;
    assert_eq!(db.get("mod", "k", 0), 1);
    assert_eq!(cache.writes(), 0);
}

#[tokio::test]
async fn test_remote_blob_is_repaired_on_read() {
    let cache = MemoryCache::new().with_blob("777", r#"{"bad": 5, "good": {"k": 1}}"#);
    let db = attach(&cache).await;
    assert_eq!(db.owners(), vec!["good".to_string()]);
}

#[tokio::test]
async fn test_unreadable_remote_blob_starts_empty() {
    let cache = MemoryCache::new().with_blob("777", "definitely not json");
    let db = attach(&cache).await;
    assert!(db.snapshot().is_empty());

    let cache = MemoryCache::new().with_blob("777", "[1, 2, 3]");
    let db = attach(&cache).await;
    assert!(db.snapshot().is_empty());
}

#[tokio::test]
async fn test_missing_remote_blob_starts_empty() {
    let cache = MemoryCache::new().with_blob("other", r#"{"mod": {}}"#);
    let db = attach(&cache).await;
    assert!(db.snapshot().is_empty());
}

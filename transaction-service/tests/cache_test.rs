//! Integration tests for the snapshot cache.

mod common;

use common::{init_tracing, transaction, MemoryStore};
use std::sync::Arc;
use std::time::Duration;
use transaction_service::services::store::TransactionStore;
use transaction_service::services::SnapshotCache;
use uuid::Uuid;

fn cache_over(store: Arc<MemoryStore>, ttl: Duration) -> SnapshotCache {
    let store: Arc<dyn TransactionStore> = store;
    SnapshotCache::new(store, ttl)
}

#[tokio::test]
async fn cold_cache_loads_and_returns_empty_snapshot() {
    init_tracing();
    let store = MemoryStore::new();
    let cache = cache_over(store.clone(), Duration::from_secs(1800));

    let snapshot = cache.get().await.unwrap();
    assert_eq!(snapshot.row_count, 0);
    assert!(snapshot.rows.is_empty());
    assert_eq!(store.load_attempts(), 1);
}

#[tokio::test]
async fn reads_within_ttl_share_one_snapshot() {
    init_tracing();
    let store = MemoryStore::new();
    store.seed(vec![transaction(
        Uuid::new_v4(),
        "R-100",
        "2025-03-01",
        "-12.50",
    )]);
    let cache = cache_over(store.clone(), Duration::from_secs(1800));

    let first = cache.get().await.unwrap();
    let second = cache.get().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(store.load_attempts(), 1);
}

#[tokio::test]
async fn expired_ttl_triggers_reload() {
    init_tracing();
    let store = MemoryStore::new();
    let cache = cache_over(store.clone(), Duration::from_millis(50));

    cache.get().await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    store.seed(vec![transaction(
        Uuid::new_v4(),
        "R-101",
        "2025-03-02",
        "40.00",
    )]);

    let snapshot = cache.get().await.unwrap();
    assert_eq!(snapshot.row_count, 1);
    assert_eq!(store.load_attempts(), 2);
}

#[tokio::test]
async fn invalidate_reloads_on_next_get() {
    init_tracing();
    let store = MemoryStore::new();
    let cache = cache_over(store.clone(), Duration::from_secs(1800));

    let before = cache.get().await.unwrap();
    assert_eq!(before.row_count, 0);

    store.seed(vec![transaction(
        Uuid::new_v4(),
        "R-102",
        "2025-03-03",
        "7.00",
    )]);
    cache.invalidate();

    let after = cache.get().await.unwrap();
    assert_eq!(after.row_count, 1);
    assert_eq!(store.load_attempts(), 2);
}

#[tokio::test]
async fn concurrent_cold_reads_coalesce_into_one_load() {
    init_tracing();
    let store = MemoryStore::new();
    store.seed(vec![transaction(
        Uuid::new_v4(),
        "R-103",
        "2025-03-04",
        "99.99",
    )]);
    store.set_load_delay(Duration::from_millis(100));
    let cache = Arc::new(cache_over(store.clone(), Duration::from_secs(1800)));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move { cache.get().await }));
    }

    for handle in handles {
        let snapshot = handle.await.unwrap().unwrap();
        assert_eq!(snapshot.row_count, 1);
    }

    assert_eq!(store.load_attempts(), 1);
}

#[tokio::test]
async fn explicit_refresh_publishes_new_snapshot() {
    init_tracing();
    let store = MemoryStore::new();
    let cache = cache_over(store.clone(), Duration::from_secs(1800));

    let before = cache.get().await.unwrap();
    assert_eq!(before.row_count, 0);

    store.seed(vec![transaction(
        Uuid::new_v4(),
        "R-104",
        "2025-03-05",
        "1.00",
    )]);
    let refreshed = cache.refresh().await.unwrap();
    assert_eq!(refreshed.row_count, 1);

    let after = cache.get().await.unwrap();
    assert!(Arc::ptr_eq(&refreshed, &after));
}

#[tokio::test]
async fn failed_reload_serves_previous_snapshot() {
    init_tracing();
    let store = MemoryStore::new();
    store.seed(vec![transaction(
        Uuid::new_v4(),
        "R-105",
        "2025-03-06",
        "5.00",
    )]);
    let cache = cache_over(store.clone(), Duration::from_secs(1800));

    let good = cache.get().await.unwrap();
    assert_eq!(good.row_count, 1);

    store.set_fail_loads(true);
    cache.invalidate();

    // Readers fail open to the previous snapshot.
    let stale = cache.get().await.unwrap();
    assert_eq!(stale.row_count, 1);

    // An explicit refresh surfaces the failure to its caller only.
    let refreshed = cache.refresh().await;
    assert!(refreshed.is_err());

    // And readers still succeed afterwards.
    let still_served = cache.get().await.unwrap();
    assert_eq!(still_served.row_count, 1);
}

#[tokio::test]
async fn never_loaded_cache_reports_unavailable() {
    init_tracing();
    let store = MemoryStore::new();
    store.set_fail_loads(true);
    let cache = cache_over(store.clone(), Duration::from_secs(1800));

    let result = cache.get().await;
    match result {
        Err(service_core::error::AppError::CacheUnavailable(_)) => {}
        other => panic!("expected CacheUnavailable, got {:?}", other.map(|s| s.row_count)),
    }
}

#[tokio::test]
async fn failed_reload_retries_are_rate_limited() {
    init_tracing();
    let store = MemoryStore::new();
    store.seed(vec![transaction(
        Uuid::new_v4(),
        "R-106",
        "2025-03-07",
        "2.00",
    )]);
    let s: Arc<dyn TransactionStore> = store.clone();
    let cache =
        SnapshotCache::with_retry_interval(s, Duration::from_secs(1800), Duration::from_secs(60));

    cache.get().await.unwrap();
    store.set_fail_loads(true);
    cache.invalidate();

    cache.get().await.unwrap();
    let attempts_after_failure = store.load_attempts();

    // Within the retry window subsequent reads serve stale without
    // touching the store again.
    cache.get().await.unwrap();
    cache.get().await.unwrap();
    assert_eq!(store.load_attempts(), attempts_after_failure);
}

#[tokio::test]
async fn warm_preloads_so_first_read_is_served() {
    init_tracing();
    let store = MemoryStore::new();
    store.seed(vec![transaction(
        Uuid::new_v4(),
        "R-107",
        "2025-03-08",
        "3.00",
    )]);
    let cache = cache_over(store.clone(), Duration::from_secs(1800));

    let warmed = cache.warm().await.unwrap();
    assert_eq!(warmed.row_count, 1);

    let status = cache.status().await;
    assert!(status.loaded);
    assert!(!status.stale);
    assert_eq!(status.row_count, 1);

    cache.get().await.unwrap();
    assert_eq!(store.load_attempts(), 1);
}

#[tokio::test]
async fn concurrent_readers_never_observe_a_partial_snapshot() {
    init_tracing();
    let tenant = Uuid::new_v4();
    let store = MemoryStore::new();
    let v1: Vec<_> = (0..100)
        .map(|i| {
            let mut t = transaction(tenant, &format!("A-{}", i), "2025-01-01", "1.00");
            t.description = "v1".to_string();
            t
        })
        .collect();
    store.seed(v1);
    let cache = Arc::new(cache_over(store.clone(), Duration::from_secs(1800)));
    cache.get().await.unwrap();

    let mut readers = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..50 {
                let snapshot = cache.get().await.unwrap();
                let markers: std::collections::HashSet<&str> = snapshot
                    .rows
                    .iter()
                    .map(|r| r.description.as_str())
                    .collect();
                // Entirely old or entirely new, never a mix.
                assert!(markers.len() <= 1, "mixed snapshot observed: {:?}", markers);
                tokio::task::yield_now().await;
            }
        }));
    }

    let v2: Vec<_> = (0..100)
        .map(|i| {
            let mut t = transaction(tenant, &format!("B-{}", i), "2025-02-01", "2.00");
            t.description = "v2".to_string();
            t
        })
        .collect();
    store.replace_all(v2);
    cache.refresh().await.unwrap();

    for reader in readers {
        reader.await.unwrap();
    }

    let final_snapshot = cache.get().await.unwrap();
    assert!(final_snapshot.rows.iter().all(|r| r.description == "v2"));
}

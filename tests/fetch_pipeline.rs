//! Integration tests for the fetch/cache pipeline
//!
//! Exercises the public bridge API against a temporary cache directory.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;

use databridge::cache::CacheEntry;
use databridge::timestamp;
use databridge::{
    DataError, Databridge, DatabridgeError, DatabridgeOptions, Datasource, FetchOptions,
    FetchOutcome,
};

/// Builds a bridge whose cache lives in a fresh temp directory
fn create_test_bridge() -> (Databridge, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let bridge = Databridge::new(
        DatabridgeOptions::default()
            .with_cache_dir(temp_dir.path().join("cache"))
            .with_default_cache_ttl(3600),
    )
    .expect("Bridge options should be valid");
    (bridge, temp_dir)
}

/// A datasource returning the sample array and counting its invocations
fn counting_source(name: &str, enable_caching: bool) -> (Datasource, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let source = Datasource::builder()
        .name(name)
        .fetcher(move |_: &[Value]| {
            counter.fetch_add(1, Ordering::SeqCst);
            FetchOutcome::value(json!(["thingys", "whatsitis"]))
        })
        .enable_caching(enable_caching)
        .build()
        .expect("Datasource should be valid");
    (source, calls)
}

fn read_entry(path: &Path) -> CacheEntry {
    let content = std::fs::read_to_string(path).expect("Cache file should be readable");
    serde_json::from_str(&content).expect("Cache file should be a valid entry")
}

fn backdate_entry(path: &Path, seconds: i64) {
    let mut entry = read_entry(path);
    entry.timestamp = timestamp::to_iso8601(Utc::now() - Duration::seconds(seconds));
    std::fs::write(path, serde_json::to_vec(&entry).unwrap()).expect("Should rewrite cache file");
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_caching_enabled_fetch_writes_cache_file() {
    let (bridge, _temp_dir) = create_test_bridge();
    let (source, calls) = counting_source("testDS", true);
    bridge.register_datasource(source).unwrap();

    let response = bridge.fetch_response("testDS", FetchOptions::new(), vec![]).unwrap();
    let data = response.data().await.expect("Fetch should succeed");

    assert_eq!(data, json!(["thingys", "whatsitis"]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let write = response.cache_write().expect("cacheWrite meta should be recorded");
    assert!(write.path.exists(), "Cache file should exist at meta path");
    assert!(write.path.starts_with(bridge.cache_store().cache_dir()));

    let entry = read_entry(&write.path);
    assert_eq!(entry.data, json!(["thingys", "whatsitis"]));
    assert_eq!(entry.timestamp, write.timestamp);
    assert!(timestamp::parse_iso8601(&entry.timestamp).is_some());
    assert!(response.cache_read().is_none());
}

#[tokio::test]
async fn test_caching_disabled_fetch_writes_nothing() {
    let (bridge, temp_dir) = create_test_bridge();
    let (source, _calls) = counting_source("testDS", false);
    bridge.register_datasource(source).unwrap();

    let response = bridge.fetch_response("testDS", FetchOptions::new(), vec![]).unwrap();
    let data = response.data().await.unwrap();

    assert_eq!(data, json!(["thingys", "whatsitis"]));
    assert_eq!(response.meta("cacheWrite").unwrap(), None);
    assert_eq!(count_files(&temp_dir.path().join("cache")), 0);
}

#[tokio::test]
async fn test_refetch_within_ttl_is_served_from_cache() {
    let (bridge, _temp_dir) = create_test_bridge();
    let (source, calls) = counting_source("testDS", true);
    bridge.register_datasource(source).unwrap();

    let first = bridge.fetch_response("testDS", FetchOptions::new(), vec![json!(1)]).unwrap();
    first.data().await.unwrap();
    let write = first.cache_write().unwrap();

    let second = bridge.fetch_response("testDS", FetchOptions::new(), vec![json!(1)]).unwrap();
    let data = second.data().await.unwrap();

    assert_eq!(data, json!(["thingys", "whatsitis"]));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "Fetcher should not run again");
    let read = second.cache_read().expect("cacheRead meta should be recorded");
    assert_eq!(read.path, write.path);
    assert_eq!(read.timestamp, write.timestamp);
    assert!(second.cache_write().is_none());
}

#[tokio::test]
async fn test_refetch_after_ttl_overwrites_cache_file() {
    let (bridge, _temp_dir) = create_test_bridge();
    let (source, calls) = counting_source("testDS", true);
    bridge.register_datasource(source).unwrap();

    let first = bridge.fetch_response("testDS", FetchOptions::new(), vec![]).unwrap();
    first.data().await.unwrap();
    let path = first.cache_write().unwrap().path;
    backdate_entry(&path, 7200);
    let old_timestamp = read_entry(&path).timestamp;

    let second = bridge.fetch_response("testDS", FetchOptions::new(), vec![]).unwrap();
    second.data().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2, "Stale entry should trigger a fetch");
    let rewritten = read_entry(&path);
    let old = timestamp::parse_iso8601(&old_timestamp).unwrap();
    let new = timestamp::parse_iso8601(&rewritten.timestamp).unwrap();
    assert!(new > old, "Cache file should carry a newer timestamp");
}

#[tokio::test]
async fn test_call_level_ttl_override() {
    let (bridge, _temp_dir) = create_test_bridge();
    let (source, calls) = counting_source("testDS", true);
    bridge.register_datasource(source).unwrap();

    bridge
        .fetch_response("testDS", FetchOptions::new(), vec![])
        .unwrap()
        .data()
        .await
        .unwrap();

    // Zero TTL never reuses an entry
    bridge
        .fetch_response("testDS", FetchOptions::new().cache_ttl(0), vec![])
        .unwrap()
        .data()
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_datasource_ttl_overrides_bridge_default() {
    let (bridge, _temp_dir) = create_test_bridge();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let source = Datasource::builder()
        .name("shortLived")
        .fetcher(move |_: &[Value]| {
            counter.fetch_add(1, Ordering::SeqCst);
            FetchOutcome::value(json!("data"))
        })
        .cache_ttl(60)
        .build()
        .unwrap();
    bridge.register_datasource(source).unwrap();

    let first = bridge.fetch_response("shortLived", FetchOptions::new(), vec![]).unwrap();
    first.data().await.unwrap();
    // Older than the source TTL but well within the bridge default
    backdate_entry(&first.cache_write().unwrap().path, 120);

    bridge
        .fetch_response("shortLived", FetchOptions::new(), vec![])
        .unwrap()
        .data()
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_call_can_disable_caching_and_ignores_existing_file() {
    let (bridge, _temp_dir) = create_test_bridge();
    let (source, calls) = counting_source("testDS", true);
    bridge.register_datasource(source).unwrap();

    let first = bridge.fetch_response("testDS", FetchOptions::new(), vec![]).unwrap();
    first.data().await.unwrap();
    let path = first.cache_write().unwrap().path;
    let before = read_entry(&path);

    let second = bridge
        .fetch_response("testDS", FetchOptions::new().enable_caching(false), vec![])
        .unwrap();
    second.data().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(second.cache_read().is_none());
    assert!(second.cache_write().is_none());
    assert_eq!(read_entry(&path), before, "Disabled caching must not touch the file");
}

#[tokio::test]
async fn test_different_params_use_different_entries() {
    let (bridge, _temp_dir) = create_test_bridge();
    let source = Datasource::new("echo", |params: &[Value]| {
        FetchOutcome::value(Value::Array(params.to_vec()))
    })
    .unwrap();
    bridge.register_datasource(source).unwrap();

    let empty = bridge.fetch_response("echo", FetchOptions::new(), vec![]).unwrap();
    let one = bridge.fetch_response("echo", FetchOptions::new(), vec![json!("a")]).unwrap();

    assert_eq!(empty.data().await.unwrap(), json!([]));
    assert_eq!(one.data().await.unwrap(), json!(["a"]));
    assert_ne!(empty.cache_write().unwrap().path, one.cache_write().unwrap().path);
}

#[tokio::test]
async fn test_fetch_failure_propagates_through_data_and_skips_cache() {
    let (bridge, temp_dir) = create_test_bridge();
    let source = Datasource::from_async("flaky", |_params| async {
        Err::<Value, _>(std::io::Error::new(std::io::ErrorKind::Other, "upstream unavailable"))
    })
    .unwrap();
    bridge.register_datasource(source).unwrap();

    let response = bridge.fetch_response("flaky", FetchOptions::new(), vec![]).unwrap();
    let err = response.data().await.unwrap_err();

    assert!(matches!(err, DataError::Fetch(_)));
    assert!(err.to_string().contains("upstream unavailable"));
    assert!(response.cache_write().is_none());
    assert_eq!(count_files(&temp_dir.path().join("cache")), 0);
}

#[tokio::test]
async fn test_cache_write_failure_still_returns_data() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("blocker");
    std::fs::write(&blocker, "a file where the cache directory should be").unwrap();
    let bridge =
        Databridge::new(DatabridgeOptions::default().with_cache_dir(blocker.join("cache")))
            .unwrap();
    let (source, _calls) = counting_source("testDS", true);
    bridge.register_datasource(source).unwrap();

    let response = bridge.fetch_response("testDS", FetchOptions::new(), vec![]).unwrap();
    let data = response.data().await.expect("Write failure must not fail the fetch");

    assert_eq!(data, json!(["thingys", "whatsitis"]));
    assert!(response.cache_write().is_none());
    let failure = response.cache_write_failure().expect("cacheWriteError meta should be recorded");
    assert_eq!(failure.operation, "create_dir");
    assert!(!failure.message.is_empty());
    assert!(response.meta("cacheWriteError").unwrap().is_some());
}

#[tokio::test]
async fn test_malformed_cache_file_is_treated_as_miss() {
    let (bridge, _temp_dir) = create_test_bridge();
    let (source, calls) = counting_source("testDS", true);
    bridge.register_datasource(source).unwrap();

    let path = bridge.cache_store().entry_path("testDS", &[]);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ definitely not json").unwrap();

    let response = bridge.fetch_response("testDS", FetchOptions::new(), vec![]).unwrap();
    assert_eq!(response.data().await.unwrap(), json!(["thingys", "whatsitis"]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(read_entry(&path).data, json!(["thingys", "whatsitis"]));
}

#[tokio::test]
async fn test_fetch_data_promise_resolves_to_data() {
    let (bridge, _temp_dir) = create_test_bridge();
    let (source, _calls) = counting_source("testDS", false);
    bridge.register_datasource(source).unwrap();

    let promise = bridge.fetch_data_promise("testDS", FetchOptions::new(), vec![]).unwrap();
    assert_eq!(promise.clone().await.unwrap(), json!(["thingys", "whatsitis"]));
    assert_eq!(promise.await.unwrap(), json!(["thingys", "whatsitis"]));
}

#[tokio::test]
async fn test_fetch_data_promise_runs_cache_pipeline() {
    let (bridge, _temp_dir) = create_test_bridge();
    let (source, calls) = counting_source("testDS", true);
    bridge.register_datasource(source).unwrap();

    let promise = bridge.fetch_data_promise("testDS", FetchOptions::new(), vec![]).unwrap();
    assert_eq!(promise.await.unwrap(), json!(["thingys", "whatsitis"]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(bridge.cache_store().entry_path("testDS", &[]).exists());
}

#[tokio::test]
async fn test_panicking_fetcher_settles_as_abandoned() {
    let (bridge, temp_dir) = create_test_bridge();
    let source = Datasource::new("boom", |_: &[Value]| -> FetchOutcome {
        panic!("fetcher exploded")
    })
    .unwrap();
    bridge.register_datasource(source).unwrap();

    let response = bridge.fetch_response("boom", FetchOptions::new(), vec![]).unwrap();
    let err = response.data().await.unwrap_err();

    assert!(matches!(err, DataError::Abandoned), "Unexpected error: {err}");
    // A clone of the same promise sees the same outcome
    assert!(matches!(response.clone().data().await, Err(DataError::Abandoned)));
    assert!(response.cache_write().is_none());
    assert_eq!(count_files(&temp_dir.path().join("cache")), 0);
}

#[tokio::test]
async fn test_cache_write_timestamp_is_taken_after_fetch() {
    let (bridge, _temp_dir) = create_test_bridge();
    let source = Datasource::from_async("slow", |_params| async {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        Ok::<_, std::io::Error>(json!("late"))
    })
    .unwrap();
    bridge.register_datasource(source).unwrap();

    let response = bridge.fetch_response("slow", FetchOptions::new(), vec![]).unwrap();
    assert_eq!(response.data().await.unwrap(), json!("late"));

    let write = response.cache_write().expect("cacheWrite meta should be recorded");
    let written_at = timestamp::parse_iso8601(&write.timestamp).unwrap();
    let requested_at = timestamp::parse_iso8601(response.request().timestamp()).unwrap();
    assert!(
        written_at > requested_at,
        "Write timestamp {} should follow request timestamp {}",
        write.timestamp,
        response.request().timestamp()
    );
    assert_eq!(read_entry(&write.path).timestamp, write.timestamp);
}

#[tokio::test]
async fn test_unknown_datasource_fails_before_any_work() {
    let (bridge, temp_dir) = create_test_bridge();
    let err = bridge.fetch("nobody", FetchOptions::new(), vec![]).unwrap_err();
    assert!(matches!(err, DatabridgeError::UnknownDatasource { .. }));
    assert!(!temp_dir.path().join("cache").exists());
}

#[tokio::test]
async fn test_concurrent_identical_fetches_both_run() {
    let (bridge, _temp_dir) = create_test_bridge();
    let (source, calls) = counting_source("testDS", true);
    bridge.register_datasource(source).unwrap();

    let first = bridge.fetch_response("testDS", FetchOptions::new(), vec![]).unwrap();
    let second = bridge.fetch_response("testDS", FetchOptions::new(), vec![]).unwrap();
    let (a, b) = futures::join!(first.data(), second.data());

    assert_eq!(a.unwrap(), b.unwrap());
    // Both may miss; at least one fetch happened and the file is a valid entry
    assert!(calls.load(Ordering::SeqCst) >= 1);
    let path = bridge.cache_store().entry_path("testDS", &[]);
    assert_eq!(read_entry(&path).data, json!(["thingys", "whatsitis"]));
}

#[test]
fn test_datasource_construction_validation() {
    assert!(Datasource::builder().build().is_err());
    assert!(Datasource::builder().name("test").build().is_err());

    let source = Datasource::new("test", |_: &[Value]| FetchOutcome::value(json!(null))).unwrap();
    assert_eq!(source.name(), "test");
}

//! The cache/fetch pipeline run for every fetch
//!
//! Caching enabled: look the entry up, serve it if fresh, otherwise fetch and
//! persist. Caching disabled: fetch and never touch the cache directory.
//! Metadata is recorded on the response before the data is returned.

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheLookup, CacheStore};
use crate::error::DataError;
use crate::request::FetchRequest;
use crate::response::{
    CacheRead, CacheWrite, CacheWriteFailure, FetchResponse, META_CACHE_READ, META_CACHE_WRITE,
    META_CACHE_WRITE_ERROR,
};

/// Runs the pipeline for `response`, returning the value its data promise settles to
pub(crate) async fn run(response: FetchResponse, store: CacheStore) -> Result<Value, DataError> {
    let request = response.request();
    let source = request.source().name();
    let policy = *request.options();

    if !policy.enable_caching {
        debug!(source, "Caching disabled, fetching");
        return fetch(request).await;
    }

    let path = store.entry_path(source, request.params());
    let lookup = store
        .lookup(&path, policy.cache_ttl, request.timestamp())
        .await;
    match lookup {
        CacheLookup::Hit(entry) => {
            debug!(source, path = %path.display(), "Cache hit");
            response.record(
                META_CACHE_READ,
                &CacheRead {
                    path,
                    timestamp: entry.timestamp,
                },
            );
            return Ok(entry.data);
        }
        CacheLookup::Stale { age_seconds } => {
            debug!(source, age_seconds, ttl = policy.cache_ttl, "Cache entry stale");
        }
        CacheLookup::Miss => {
            debug!(source, "Cache miss");
        }
        CacheLookup::Unreadable(e) => {
            warn!(source, "Ignoring unreadable cache entry: {e}");
        }
    }

    let data = fetch(request).await?;

    let written = store.write(&path, &data).await;
    match written {
        Ok(timestamp) => {
            response.record(META_CACHE_WRITE, &CacheWrite { path, timestamp });
        }
        Err(e) => {
            warn!(source, "Failed to write cache entry: {e}");
            response.record(
                META_CACHE_WRITE_ERROR,
                &CacheWriteFailure {
                    path: e.path().to_path_buf(),
                    operation: e.operation().to_string(),
                    message: e.to_string(),
                },
            );
        }
    }

    Ok(data)
}

async fn fetch(request: &FetchRequest) -> Result<Value, DataError> {
    let source = request.source();
    source
        .fetch_data_promise(request.params())
        .await
        .map_err(|e| {
            debug!(source = source.name(), "Fetch failed: {e}");
            DataError::Fetch(e)
        })
}

//! Cache store for persisting fetched data to disk
//!
//! Provides a `CacheStore` that keeps one JSON file per (datasource,
//! parameters) pair. Each file holds the fetched data and the time it was
//! written; freshness is decided at read time against a caller-supplied TTL.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};

use super::key;
use crate::error::CacheError;
use crate::timestamp;

/// Distinguishes temporary files written concurrently by one process
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A cache entry as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached data
    pub data: Value,
    /// When the entry was written, as an ISO-8601 string
    pub timestamp: String,
}

impl CacheEntry {
    /// The write time, or `None` if the stored timestamp is malformed
    pub fn written_at(&self) -> Option<DateTime<Utc>> {
        timestamp::parse_iso8601(&self.timestamp)
    }
}

/// Outcome of checking the cache for one request
#[derive(Debug)]
pub enum CacheLookup {
    /// A fresh entry was found
    Hit(CacheEntry),
    /// An entry exists but is older than the TTL
    Stale {
        /// Age of the entry in seconds
        age_seconds: f64,
    },
    /// No entry exists
    Miss,
    /// The entry could not be read or parsed
    Unreadable(CacheError),
}

/// Summary of one entry in the cache directory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntryInfo {
    /// Path of the cache file
    pub path: PathBuf,
    /// Write timestamp stored in the entry
    pub timestamp: String,
    /// Seconds between the write and the listing
    pub age_seconds: f64,
}

/// Returns true if an entry of the given age may still be served
///
/// A TTL of zero never matches. Negative ages (entries dated in the future)
/// count as zero.
pub fn is_fresh_age(age_seconds: f64, ttl_seconds: u64) -> bool {
    ttl_seconds > 0 && age_seconds.max(0.0) <= ttl_seconds as f64
}

/// Returns true if an entry written at `written_at` may still be served at `now`
pub fn is_fresh(written_at: DateTime<Utc>, now: DateTime<Utc>, ttl_seconds: u64) -> bool {
    is_fresh_age(timestamp::seconds_between(written_at, now), ttl_seconds)
}

/// Manages reading and writing cache entries in one directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
}

impl CacheStore {
    /// Creates a store rooted at the given directory
    ///
    /// The directory is created lazily on the first write.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Directory where cache files are stored
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path to the cache file for a datasource and its parameters
    pub fn entry_path(&self, source_name: &str, params: &[Value]) -> PathBuf {
        self.cache_dir.join(key::cache_file_name(source_name, params))
    }

    /// Ensures the cache directory exists
    async fn ensure_dir(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| CacheError::io("create_dir", &self.cache_dir, e))
    }

    /// Reads an entry from disk
    ///
    /// # Returns
    /// * `Ok(Some(entry))` if the file exists and parses
    /// * `Ok(None)` if the file does not exist
    /// * `Err` if the file cannot be read or is not a valid entry
    pub async fn read(&self, path: &Path) -> Result<Option<CacheEntry>, CacheError> {
        let content = match fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io("read", path, e)),
        };
        let entry: CacheEntry =
            serde_json::from_slice(&content).map_err(|source| CacheError::Serialization {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Some(entry))
    }

    /// Checks the entry at `path` against a TTL, measuring age up to the
    /// ISO-8601 timestamp `now`
    pub async fn lookup(&self, path: &Path, ttl_seconds: u64, now: &str) -> CacheLookup {
        let entry = match self.read(path).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return CacheLookup::Miss,
            Err(e) => return CacheLookup::Unreadable(e),
        };

        let Some(age_seconds) = timestamp::elapsed_seconds(&entry.timestamp, now) else {
            return CacheLookup::Unreadable(CacheError::io(
                "read",
                path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("invalid timestamp '{}'", entry.timestamp),
                ),
            ));
        };

        if is_fresh_age(age_seconds, ttl_seconds) {
            CacheLookup::Hit(entry)
        } else {
            CacheLookup::Stale { age_seconds }
        }
    }

    /// Writes data to the entry at `path`, stamped with the current time
    ///
    /// The directory is created if missing, and the file is replaced through a
    /// rename so readers never observe a partial entry.
    ///
    /// # Returns
    /// * `Ok(timestamp)` with the ISO-8601 write time stored in the entry
    /// * `Err` if directory creation, encoding or writing fails
    pub async fn write(&self, path: &Path, data: &Value) -> Result<String, CacheError> {
        self.ensure_dir().await?;

        let entry = CacheEntry {
            data: data.clone(),
            timestamp: timestamp::now_iso8601(),
        };
        let json = serde_json::to_vec_pretty(&entry).map_err(|source| CacheError::Serialization {
            path: path.to_path_buf(),
            source,
        })?;

        let tmp_path = path.with_extension(format!(
            "json.{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        if let Err(e) = fs::write(&tmp_path, json).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(CacheError::io("write", path, e));
        }
        if let Err(e) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(CacheError::io("write", path, e));
        }

        debug!(path = %path.display(), "Wrote cache entry");
        Ok(entry.timestamp)
    }

    /// Lists every readable entry in the cache directory, oldest first
    ///
    /// A missing directory yields an empty list. Files that are not valid
    /// entries are skipped.
    pub async fn list_entries(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<CacheEntryInfo>, CacheError> {
        let mut entries = Vec::new();
        for path in self.entry_files().await? {
            match self.read(&path).await {
                Ok(Some(entry)) => {
                    let Some(written_at) = entry.written_at() else {
                        warn!(
                            path = %path.display(),
                            "Skipping cache entry with invalid timestamp"
                        );
                        continue;
                    };
                    entries.push(CacheEntryInfo {
                        age_seconds: timestamp::seconds_between(written_at, now),
                        timestamp: entry.timestamp,
                        path,
                    });
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable cache entry: {e}"),
            }
        }
        entries.sort_by(|a, b| b.age_seconds.total_cmp(&a.age_seconds));
        Ok(entries)
    }

    /// Deletes entries that are no longer fresh under `ttl_seconds`
    ///
    /// # Returns
    /// The number of files removed
    pub async fn prune_expired(
        &self,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<usize, CacheError> {
        let mut removed = 0;
        for info in self.list_entries(now).await? {
            let fresh = timestamp::parse_iso8601(&info.timestamp)
                .is_some_and(|written_at| is_fresh(written_at, now, ttl_seconds));
            if !fresh {
                remove_entry(&info.path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Deletes every cache entry in the cache directory
    ///
    /// Only files that parse as cache entries are removed; other `*.json`
    /// files sharing the directory are left alone.
    ///
    /// # Returns
    /// The number of files removed
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.entry_files().await? {
            match self.read(&path).await {
                Ok(Some(_)) => {
                    remove_entry(&path).await?;
                    removed += 1;
                }
                Ok(None) => {}
                Err(e) => debug!("Leaving non-entry file in place: {e}"),
            }
        }
        Ok(removed)
    }

    /// Paths of all `*.json` files in the cache directory, empty if it is missing
    async fn entry_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let mut dir = match fs::read_dir(&self.cache_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io("list", &self.cache_dir, e)),
        };
        let mut files = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| CacheError::io("list", &self.cache_dir, e))?
        {
            let path = item.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

async fn remove_entry(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io("remove", path, e)),
    }
}

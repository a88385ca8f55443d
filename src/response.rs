//! Fetch responses: a request, its eventual data, and metadata about how it was served
//!
//! A [`FetchResponse`] is handed to the caller as soon as a fetch starts. The
//! data promise is set exactly once and can be awaited from any clone of the
//! response. Metadata is filled in by the pipeline before the data settles, so
//! once the data is available the cache records below are final.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ContractError, DataError};
use crate::request::FetchRequest;
use crate::validate::{self, ValidationError};

/// Metadata key recording a cache hit
pub const META_CACHE_READ: &str = "cacheRead";
/// Metadata key recording a successful cache write
pub const META_CACHE_WRITE: &str = "cacheWrite";
/// Metadata key recording a failed cache write
pub const META_CACHE_WRITE_ERROR: &str = "cacheWriteError";

/// The write-once data channel of a response; clone it to await it again
pub type DataPromise = Shared<BoxFuture<'static, Result<Value, DataError>>>;

/// Where a cache hit was served from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRead {
    /// Cache file that was read
    pub path: PathBuf,
    /// Write timestamp stored in the entry
    pub timestamp: String,
}

/// Where fetched data was persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheWrite {
    /// Cache file that was written
    pub path: PathBuf,
    /// Write timestamp stored in the entry
    pub timestamp: String,
}

/// Why fetched data could not be persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheWriteFailure {
    /// Path that failed
    pub path: PathBuf,
    /// Operation that failed (e.g. "create_dir", "write")
    pub operation: String,
    /// Error message
    pub message: String,
}

struct ResponseInner {
    request: FetchRequest,
    data: OnceLock<DataPromise>,
    meta: Mutex<HashMap<String, Value>>,
}

/// Envelope carrying a request's eventual data and metadata
#[derive(Clone)]
pub struct FetchResponse {
    inner: Arc<ResponseInner>,
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("request", &self.inner.request)
            .field("data_set", &self.inner.data.get().is_some())
            .field("meta", &*self.lock_meta())
            .finish()
    }
}

impl FetchResponse {
    /// Creates a response with empty metadata
    pub fn new(request: FetchRequest) -> Self {
        Self::with_meta(request, HashMap::new())
    }

    /// Creates a response with initial metadata
    pub fn with_meta(request: FetchRequest, meta: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(ResponseInner {
                request,
                data: OnceLock::new(),
                meta: Mutex::new(meta),
            }),
        }
    }

    /// The originating request
    pub fn request(&self) -> &FetchRequest {
        &self.inner.request
    }

    /// Sets the data promise
    ///
    /// # Returns
    /// * `Err(ContractError::DataAlreadySet)` if a promise was set before
    pub fn set_data_promise<F>(&self, fut: F) -> Result<(), ContractError>
    where
        F: Future<Output = Result<Value, DataError>> + Send + 'static,
    {
        self.install_data_promise(fut.boxed().shared())
    }

    pub(crate) fn install_data_promise(&self, promise: DataPromise) -> Result<(), ContractError> {
        self.inner
            .data
            .set(promise)
            .map_err(|_| ContractError::DataAlreadySet)
    }

    /// The data promise, if one has been set
    pub fn data_promise(&self) -> Option<DataPromise> {
        self.inner.data.get().cloned()
    }

    /// Awaits the response's data
    pub async fn data(&self) -> Result<Value, DataError> {
        match self.data_promise() {
            Some(promise) => promise.await,
            None => Err(DataError::NotSet),
        }
    }

    /// Reads one metadata entry
    pub fn meta(&self, key: &str) -> Result<Option<Value>, ValidationError> {
        validate::non_empty("key", key)?;
        Ok(self.lock_meta().get(key).cloned())
    }

    /// Writes one metadata entry and returns the stored value
    pub fn set_meta(&self, key: &str, value: Value) -> Result<Value, ValidationError> {
        validate::non_empty("key", key)?;
        self.lock_meta().insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// A copy of all metadata; changing it does not affect the response
    pub fn all_meta(&self) -> HashMap<String, Value> {
        self.lock_meta().clone()
    }

    /// Cache hit record, if the data came from the cache
    pub fn cache_read(&self) -> Option<CacheRead> {
        self.typed_meta(META_CACHE_READ)
    }

    /// Cache write record, if fetched data was persisted
    pub fn cache_write(&self) -> Option<CacheWrite> {
        self.typed_meta(META_CACHE_WRITE)
    }

    /// Cache write failure, if persisting fetched data failed
    pub fn cache_write_failure(&self) -> Option<CacheWriteFailure> {
        self.typed_meta(META_CACHE_WRITE_ERROR)
    }

    pub(crate) fn record<T: Serialize>(&self, key: &str, record: &T) {
        if let Ok(value) = serde_json::to_value(record) {
            self.lock_meta().insert(key.to_string(), value);
        }
    }

    fn typed_meta<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.lock_meta().get(key).cloned()?;
        serde_json::from_value(value).ok()
    }

    fn lock_meta(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.inner.meta.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//! The databridge: a registry of named datasources in front of a shared disk cache
//!
//! [`Databridge`] is a cheap handle; clones share the same registry and
//! options. Fetches return a [`FetchResponse`] immediately and run the cache
//! pipeline on a spawned Tokio task.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use directories::ProjectDirs;
use futures::FutureExt;
use serde_json::Value;
use tracing::info;

use crate::cache::CacheStore;
use crate::datasource::Datasource;
use crate::error::{DataError, DatabridgeError};
use crate::pipeline;
use crate::request::{FetchOptions, FetchRequest};
use crate::response::{DataPromise, FetchResponse};
use crate::timestamp;
use crate::validate::{self, ValidationError};

/// Default cache directory, relative to the working directory
pub const DEFAULT_CACHE_DIR: &str = "./databridgeJsonCache";

/// Default TTL for cache entries in seconds
pub const DEFAULT_CACHE_TTL: u64 = 3600;

/// Bridge method names a datasource may not take
pub const RESERVED_NAMES: &[&str] = &[
    "new",
    "option",
    "options",
    "register_datasource",
    "register",
    "datasource",
    "source",
    "datasource_names",
    "shortcut",
    "cache_store",
    "fetch_response",
    "fetch",
    "fetch_data_promise",
];

/// Bridge-wide configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabridgeOptions {
    /// Directory holding cache files
    pub cache_dir: PathBuf,
    /// TTL in seconds for sources and calls that do not set one
    pub default_cache_ttl: u64,
}

impl Default for DatabridgeOptions {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            default_cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl DatabridgeOptions {
    /// Sets the cache directory
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    /// Sets the default TTL in seconds
    pub fn with_default_cache_ttl(mut self, seconds: u64) -> Self {
        self.default_cache_ttl = seconds;
        self
    }

    /// Platform cache directory for an application (`~/.cache/<app>/` on Linux)
    ///
    /// Returns `None` if no home directory can be determined.
    pub fn project_cache_dir(app_name: &str) -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", app_name)?;
        Some(project_dirs.cache_dir().to_path_buf())
    }

    /// Checks that the default TTL is positive
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate::positive_ttl("default_cache_ttl", self.default_cache_ttl)
    }
}

struct BridgeInner {
    options: DatabridgeOptions,
    cache: CacheStore,
    datasources: RwLock<HashMap<String, Arc<Datasource>>>,
}

/// Registry of datasources and coordinator of their fetches
#[derive(Clone)]
pub struct Databridge {
    inner: Arc<BridgeInner>,
}

impl fmt::Debug for Databridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Databridge")
            .field("options", &self.inner.options)
            .field("datasources", &self.datasource_names())
            .finish()
    }
}

impl Databridge {
    /// Creates a bridge with no datasources
    pub fn new(options: DatabridgeOptions) -> Result<Self, ValidationError> {
        options.validate()?;
        let cache = CacheStore::new(options.cache_dir.clone());
        Ok(Self {
            inner: Arc::new(BridgeInner {
                options,
                cache,
                datasources: RwLock::new(HashMap::new()),
            }),
        })
    }

    /// The bridge's configuration
    pub fn options(&self) -> &DatabridgeOptions {
        &self.inner.options
    }

    /// Looks up one option by name, `None` if unknown
    ///
    /// Accepts `cacheDir`/`cache_dir` and `defaultCacheTTL`/`default_cache_ttl`.
    pub fn option(&self, name: &str) -> Option<Value> {
        let options = &self.inner.options;
        match name {
            "cacheDir" | "cache_dir" => {
                Some(Value::String(options.cache_dir.display().to_string()))
            }
            "defaultCacheTTL" | "default_cache_ttl" => {
                Some(Value::from(options.default_cache_ttl))
            }
            _ => None,
        }
    }

    /// The store backing this bridge's cache
    pub fn cache_store(&self) -> &CacheStore {
        &self.inner.cache
    }

    /// Registers a datasource under its name
    ///
    /// # Returns
    /// * `Ok(&self)` so registrations can be chained
    /// * `Err(DatabridgeError::NameConflict)` if the name is taken or reserved;
    ///   the registry is left unchanged
    pub fn register_datasource(&self, datasource: Datasource) -> Result<&Self, DatabridgeError> {
        let name = datasource.name().to_string();
        if RESERVED_NAMES.contains(&name.as_str()) {
            return Err(DatabridgeError::NameConflict {
                name,
                reason: "a reserved bridge method".to_string(),
            });
        }

        let mut datasources = self
            .inner
            .datasources
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if datasources.contains_key(&name) {
            return Err(DatabridgeError::NameConflict {
                name,
                reason: "an already registered datasource".to_string(),
            });
        }

        info!(source = %name, "Registered datasource");
        datasources.insert(name, Arc::new(datasource));
        Ok(self)
    }

    /// Alias for [`Databridge::register_datasource`]
    pub fn register(&self, datasource: Datasource) -> Result<&Self, DatabridgeError> {
        self.register_datasource(datasource)
    }

    /// The datasource registered under `name`, if any
    pub fn datasource(&self, name: &str) -> Option<Arc<Datasource>> {
        self.inner
            .datasources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Alias for [`Databridge::datasource`]
    pub fn source(&self, name: &str) -> Option<Arc<Datasource>> {
        self.datasource(name)
    }

    /// Names of all registered datasources, sorted
    pub fn datasource_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .datasources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// A handle that fetches from one registered datasource
    pub fn shortcut(&self, name: &str) -> Option<SourceShortcut> {
        self.datasource(name).map(|source| SourceShortcut {
            bridge: self.clone(),
            name: source.name().to_string(),
        })
    }

    /// Starts a fetch and returns its response without waiting for the data
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Returns
    /// * `Err(DatabridgeError::UnknownDatasource)` if `name` is not registered
    /// * `Err(DatabridgeError::NoRuntime)` if no Tokio runtime is running
    pub fn fetch_response(
        &self,
        name: &str,
        options: FetchOptions,
        params: Vec<Value>,
    ) -> Result<FetchResponse, DatabridgeError> {
        let (response, _promise) = self.start_fetch(name, options, params)?;
        Ok(response)
    }

    /// Alias for [`Databridge::fetch_response`]
    pub fn fetch(
        &self,
        name: &str,
        options: FetchOptions,
        params: Vec<Value>,
    ) -> Result<FetchResponse, DatabridgeError> {
        self.fetch_response(name, options, params)
    }

    /// Starts a fetch and returns only its data promise
    pub fn fetch_data_promise(
        &self,
        name: &str,
        options: FetchOptions,
        params: Vec<Value>,
    ) -> Result<DataPromise, DatabridgeError> {
        let (_response, promise) = self.start_fetch(name, options, params)?;
        Ok(promise)
    }

    /// Builds the request and response, spawns the pipeline, and returns the
    /// response together with its data promise
    fn start_fetch(
        &self,
        name: &str,
        options: FetchOptions,
        params: Vec<Value>,
    ) -> Result<(FetchResponse, DataPromise), DatabridgeError> {
        let source = self
            .datasource(name)
            .ok_or_else(|| DatabridgeError::UnknownDatasource {
                name: name.to_string(),
            })?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| DatabridgeError::NoRuntime)?;

        let policy = options.resolve(source.options(), self.inner.options.default_cache_ttl);
        let request = FetchRequest::new(
            self.clone(),
            source,
            policy,
            params,
            timestamp::now_iso8601(),
        )?;
        let response = FetchResponse::new(request);

        let task = runtime.spawn(pipeline::run(response.clone(), self.inner.cache.clone()));
        let promise: DataPromise = task
            .map(|joined| joined.unwrap_or(Err(DataError::Abandoned)))
            .boxed()
            .shared();
        // The response was created above, so its promise is still unset
        let _ = response.install_data_promise(promise.clone());

        Ok((response, promise))
    }
}

/// Fetch handle bound to one datasource of a bridge
#[derive(Debug, Clone)]
pub struct SourceShortcut {
    bridge: Databridge,
    name: String,
}

impl SourceShortcut {
    /// Name of the datasource this handle fetches from
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Forwards to [`Databridge::fetch_response`] for this datasource
    pub fn fetch(
        &self,
        options: FetchOptions,
        params: Vec<Value>,
    ) -> Result<FetchResponse, DatabridgeError> {
        self.bridge.fetch_response(&self.name, options, params)
    }
}

//! Named datasources wrapping a fetch function
//!
//! A [`Datasource`] pairs a unique name with a [`Fetcher`] and the caching
//! policy the bridge should apply to it. Fetchers may answer immediately or
//! hand back a future; [`FetchOutcome`] covers both.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value;

use crate::error::{BoxError, FetchFailure};
use crate::validate::{self, ValidationError};

/// Result of invoking a fetcher: either already settled or still pending
pub enum FetchOutcome {
    /// The fetcher produced its result synchronously
    Ready(Result<Value, FetchFailure>),
    /// The fetcher returned a computation that settles later
    Pending(BoxFuture<'static, Result<Value, FetchFailure>>),
}

impl FetchOutcome {
    /// A synchronously available value
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Ready(Ok(value.into()))
    }

    /// A synchronous failure
    pub fn failed(error: impl Into<BoxError>) -> Self {
        Self::Ready(Err(FetchFailure::new(error)))
    }

    /// A value produced by a future
    pub fn pending<F, E>(fut: F) -> Self
    where
        F: Future<Output = Result<Value, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::Pending(fut.map(|res| res.map_err(FetchFailure::new)).boxed())
    }

    /// Normalizes the outcome into a single future
    ///
    /// Pending results are forwarded unchanged, including their failures.
    pub fn into_future(self) -> BoxFuture<'static, Result<Value, FetchFailure>> {
        match self {
            Self::Ready(result) => future::ready(result).boxed(),
            Self::Pending(fut) => fut,
        }
    }
}

impl From<Value> for FetchOutcome {
    fn from(value: Value) -> Self {
        Self::value(value)
    }
}

impl fmt::Debug for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// The capability a datasource wraps: turn parameters into data
pub trait Fetcher: Send + Sync {
    /// Invokes the fetch with the caller's positional parameters
    fn fetch(&self, params: &[Value]) -> FetchOutcome;
}

impl<F> Fetcher for F
where
    F: Fn(&[Value]) -> FetchOutcome + Send + Sync,
{
    fn fetch(&self, params: &[Value]) -> FetchOutcome {
        self(params)
    }
}

/// Caching policy attached to a datasource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasourceOptions {
    /// Whether fetches for this source read and write the cache
    pub enable_caching: bool,
    /// TTL in seconds; `None` defers to the bridge default
    pub cache_ttl: Option<u64>,
}

impl Default for DatasourceOptions {
    fn default() -> Self {
        Self {
            enable_caching: true,
            cache_ttl: None,
        }
    }
}

impl DatasourceOptions {
    /// Checks that an explicit TTL is positive
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(ttl) = self.cache_ttl {
            validate::positive_ttl("cache_ttl", ttl)?;
        }
        Ok(())
    }
}

/// A named, reusable wrapper around a fetch function and its caching policy
#[derive(Clone)]
pub struct Datasource {
    name: String,
    fetcher: Arc<dyn Fetcher>,
    options: DatasourceOptions,
}

impl fmt::Debug for Datasource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datasource")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Datasource {
    /// Creates a datasource with default options from a synchronous-or-pending fetch function
    pub fn new<F>(name: impl Into<String>, fetcher: F) -> Result<Self, ValidationError>
    where
        F: Fn(&[Value]) -> FetchOutcome + Send + Sync + 'static,
    {
        Self::builder().name(name).fetcher(fetcher).build()
    }

    /// Creates a datasource with default options from an async fetch function
    ///
    /// The function receives an owned copy of the parameters.
    pub fn from_async<F, Fut, E>(
        name: impl Into<String>,
        fetcher: F,
    ) -> Result<Self, ValidationError>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::builder().name(name).async_fetcher(fetcher).build()
    }

    /// Starts building a datasource
    pub fn builder() -> DatasourceBuilder {
        DatasourceBuilder::default()
    }

    /// The datasource's unique name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wrapped fetch function
    pub fn data_fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    /// The datasource's caching policy
    pub fn options(&self) -> &DatasourceOptions {
        &self.options
    }

    /// Looks up one option by name, `None` if unknown or unset
    ///
    /// Accepts `enableCaching`/`enable_caching` and `cacheTTL`/`cache_ttl`.
    pub fn option(&self, key: &str) -> Option<Value> {
        match key {
            "enableCaching" | "enable_caching" => Some(Value::Bool(self.options.enable_caching)),
            "cacheTTL" | "cache_ttl" => self.options.cache_ttl.map(Value::from),
            _ => None,
        }
    }

    /// Invokes the fetcher and normalizes its result into a single future
    pub fn fetch_data_promise(
        &self,
        params: &[Value],
    ) -> BoxFuture<'static, Result<Value, FetchFailure>> {
        self.fetcher.fetch(params).into_future()
    }
}

/// Builder for [`Datasource`]; `build` reports missing pieces as validation errors
#[derive(Default)]
pub struct DatasourceBuilder {
    name: Option<String>,
    fetcher: Option<Arc<dyn Fetcher>>,
    options: DatasourceOptions,
}

impl DatasourceBuilder {
    /// Sets the datasource name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets a synchronous-or-pending fetch function
    pub fn fetcher<F>(self, fetcher: F) -> Self
    where
        F: Fn(&[Value]) -> FetchOutcome + Send + Sync + 'static,
    {
        self.shared_fetcher(Arc::new(fetcher))
    }

    /// Sets an async fetch function
    pub fn async_fetcher<F, Fut, E>(self, fetcher: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.fetcher(move |params: &[Value]| FetchOutcome::pending(fetcher(params.to_vec())))
    }

    /// Sets an already shared fetcher, e.g. a type implementing [`Fetcher`]
    pub fn shared_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Enables or disables caching for this source
    pub fn enable_caching(mut self, enabled: bool) -> Self {
        self.options.enable_caching = enabled;
        self
    }

    /// Sets the source's TTL in seconds
    pub fn cache_ttl(mut self, seconds: u64) -> Self {
        self.options.cache_ttl = Some(seconds);
        self
    }

    /// Replaces all options at once
    pub fn options(mut self, options: DatasourceOptions) -> Self {
        self.options = options;
        self
    }

    /// Validates and builds the datasource
    pub fn build(self) -> Result<Datasource, ValidationError> {
        let name = validate::required("name", self.name)?;
        validate::non_empty("name", &name)?;
        let fetcher = validate::required("fetcher", self.fetcher)?;
        self.options.validate()?;

        Ok(Datasource {
            name,
            fetcher,
            options: self.options,
        })
    }
}

//! Error types for the databridge
//!
//! Synchronous failures (bad arguments, name conflicts, unknown sources) are
//! returned directly from the call that caused them. Fetch failures travel
//! through a response's data promise as [`DataError`]. Cache failures never
//! fail a fetch: unreadable entries count as misses and write failures are
//! recorded in the response metadata.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

pub use crate::validate::ValidationError;

/// Boxed error type returned by fetchers
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised synchronously by the bridge
#[derive(Debug, Error)]
pub enum DatabridgeError {
    /// Malformed constructor or method argument
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A datasource with this name cannot be registered
    #[error("Datasource name '{name}' conflicts with {reason}")]
    NameConflict {
        /// The rejected datasource name
        name: String,
        /// What the name collided with
        reason: String,
    },

    /// No datasource is registered under this name
    #[error("Unknown datasource: '{name}'")]
    UnknownDatasource {
        /// The name that was looked up
        name: String,
    },

    /// A fetch was started outside a Tokio runtime
    #[error("fetch requires a running Tokio runtime")]
    NoRuntime,
}

/// A fetcher's failure, cheap to clone so every awaiting caller sees it
#[derive(Clone)]
pub struct FetchFailure(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl FetchFailure {
    /// Wraps a fetcher error
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self(Arc::from(error.into()))
    }

    /// Creates a failure from a plain message
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(message.into())
    }

    /// The underlying fetcher error
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl fmt::Debug for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FetchFailure").field(&self.0.to_string()).finish()
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for FetchFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// Failure delivered through a response's data promise
#[derive(Debug, Clone, Error)]
pub enum DataError {
    /// The datasource's fetcher failed
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchFailure),

    /// The pipeline stopped before settling the data (e.g. runtime shutdown)
    #[error("Fetch pipeline ended before producing data")]
    Abandoned,

    /// No data promise was ever set on the response
    #[error("No data promise has been set on this response")]
    NotSet,
}

/// Violation of the write-once data promise contract
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// The data promise was already set
    #[error("data promise has already been set")]
    DataAlreadySet,
}

/// Errors from cache store file operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error during a cache operation
    #[error("Cache {operation} failed for {}: {source}", path.display())]
    Io {
        /// Operation that failed (e.g. "read", "write", "create_dir")
        operation: &'static str,
        /// Path involved in the failure
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Entry could not be encoded or decoded
    #[error("Cache entry serialization failed for {}: {source}", path.display())]
    Serialization {
        /// Path of the entry
        path: PathBuf,
        /// The underlying serde error
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub(crate) fn io(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Short name of the failed operation
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Io { operation, .. } => operation,
            Self::Serialization { .. } => "serialize",
        }
    }

    /// Path of the file or directory involved
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Io { path, .. } | Self::Serialization { path, .. } => path,
        }
    }
}

//! Fetch requests and the per-call options that shape them

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bridge::Databridge;
use crate::datasource::{Datasource, DatasourceOptions};
use crate::timestamp;
use crate::validate::{self, ValidationError};

/// Per-call overrides of a datasource's caching policy
///
/// Unset fields fall back to the datasource, then to the bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOptions {
    /// Override whether this call uses the cache
    pub enable_caching: Option<bool>,
    /// Override the TTL in seconds; zero means never reuse a cached entry
    #[serde(rename = "cacheTTL")]
    pub cache_ttl: Option<u64>,
}

impl FetchOptions {
    /// Options that defer entirely to the datasource and bridge
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides caching for this call
    pub fn enable_caching(mut self, enabled: bool) -> Self {
        self.enable_caching = Some(enabled);
        self
    }

    /// Overrides the TTL for this call
    pub fn cache_ttl(mut self, seconds: u64) -> Self {
        self.cache_ttl = Some(seconds);
        self
    }

    /// Resolves the effective policy: call override, then datasource, then bridge default
    pub fn resolve(&self, source: &DatasourceOptions, default_cache_ttl: u64) -> CachePolicy {
        CachePolicy {
            enable_caching: self.enable_caching.unwrap_or(source.enable_caching),
            cache_ttl: self
                .cache_ttl
                .or(source.cache_ttl)
                .unwrap_or(default_cache_ttl),
        }
    }
}

/// The caching policy actually applied to one fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePolicy {
    /// Whether the cache is read and written
    pub enable_caching: bool,
    /// Maximum age in seconds of a reusable entry
    #[serde(rename = "cacheTTL")]
    pub cache_ttl: u64,
}

/// Immutable description of one fetch invocation
#[derive(Debug, Clone)]
pub struct FetchRequest {
    bridge: Databridge,
    source: Arc<Datasource>,
    options: CachePolicy,
    params: Vec<Value>,
    timestamp: String,
    issued_at: DateTime<Utc>,
}

impl FetchRequest {
    /// Creates a request, validating the timestamp
    pub fn new(
        bridge: Databridge,
        source: Arc<Datasource>,
        options: CachePolicy,
        params: Vec<Value>,
        timestamp: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::builder()
            .bridge(bridge)
            .source(source)
            .options(options)
            .params(params)
            .timestamp(timestamp)
            .build()
    }

    /// Starts building a request
    pub fn builder() -> FetchRequestBuilder {
        FetchRequestBuilder::default()
    }

    /// The bridge that issued the request
    pub fn bridge(&self) -> &Databridge {
        &self.bridge
    }

    /// Alias for [`FetchRequest::bridge`]
    pub fn databridge(&self) -> &Databridge {
        &self.bridge
    }

    /// The datasource being fetched
    pub fn source(&self) -> &Arc<Datasource> {
        &self.source
    }

    /// Alias for [`FetchRequest::source`]
    pub fn datasource(&self) -> &Arc<Datasource> {
        &self.source
    }

    /// Effective cache policy after merging call, datasource and bridge options
    pub fn options(&self) -> &CachePolicy {
        &self.options
    }

    /// Alias for [`FetchRequest::options`]
    pub fn fetch_options(&self) -> &CachePolicy {
        &self.options
    }

    /// Parameters passed to the fetcher, also part of the cache key
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Alias for [`FetchRequest::params`]
    pub fn fetcher_params(&self) -> &[Value] {
        &self.params
    }

    /// When the request was issued, as an ISO-8601 string
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// When the request was issued
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

/// Builder for [`FetchRequest`]; every field is required
#[derive(Default)]
pub struct FetchRequestBuilder {
    bridge: Option<Databridge>,
    source: Option<Arc<Datasource>>,
    options: Option<CachePolicy>,
    params: Option<Vec<Value>>,
    timestamp: Option<String>,
}

impl FetchRequestBuilder {
    /// Sets the issuing bridge
    pub fn bridge(mut self, bridge: Databridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Sets the datasource to fetch
    pub fn source(mut self, source: Arc<Datasource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the effective cache policy
    pub fn options(mut self, options: CachePolicy) -> Self {
        self.options = Some(options);
        self
    }

    /// Sets the fetcher parameters
    pub fn params(mut self, params: Vec<Value>) -> Self {
        self.params = Some(params);
        self
    }

    /// Sets the issue time; must be ISO-8601
    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Validates and builds the request
    pub fn build(self) -> Result<FetchRequest, ValidationError> {
        let bridge = validate::required("bridge", self.bridge)?;
        let source = validate::required("source", self.source)?;
        let options = validate::required("fetch_options", self.options)?;
        let params = validate::required("fetcher_params", self.params)?;
        let timestamp = validate::required("timestamp", self.timestamp)?;
        validate::iso8601("timestamp", &timestamp)?;
        let issued_at = timestamp::parse_iso8601(&timestamp)
            .ok_or_else(|| ValidationError::new("timestamp", "not a valid ISO-8601 timestamp"))?;

        Ok(FetchRequest {
            bridge,
            source,
            options,
            params,
            timestamp,
            issued_at,
        })
    }
}

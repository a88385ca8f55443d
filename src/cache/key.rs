//! Cache file naming
//!
//! A cache file is named `<name>-<digest>.json`. The name part is the
//! datasource name with anything outside `[A-Za-z0-9_-]` replaced by `_`, kept
//! only to make the directory readable. The digest is the first 16 bytes of a
//! SHA-256 over the raw datasource name, a NUL separator, and the compact JSON
//! encoding of the parameter array. `serde_json` maps serialize with sorted
//! keys, so equal parameter lists always produce the same digest.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Number of digest bytes kept in the file name
const DIGEST_BYTES: usize = 16;

/// Longest sanitized name prefix kept in the file name
const MAX_NAME_CHARS: usize = 64;

/// Returns the hex digest identifying a (datasource, parameters) pair
pub fn params_digest(source_name: &str, params: &[Value]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_name.as_bytes());
    hasher.update([0u8]);
    // Serializing a slice of `Value` cannot fail
    let encoded = serde_json::to_vec(params).unwrap_or_default();
    hasher.update(&encoded);
    let digest = hasher.finalize();
    hex::encode(&digest[..DIGEST_BYTES])
}

/// Returns the cache file name for a (datasource, parameters) pair
pub fn cache_file_name(source_name: &str, params: &[Value]) -> String {
    format!(
        "{}-{}.json",
        sanitize_name(source_name),
        params_digest(source_name, params)
    )
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .take(MAX_NAME_CHARS)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

//! Cache module for storing fetched data to disk
//!
//! One JSON file per (datasource, parameters) pair holds the fetched data and
//! its write time. Whether an entry may be reused is decided when it is read,
//! by comparing its age to the TTL in effect for that request.

mod key;
mod store;

pub use key::{cache_file_name, params_digest};
pub use store::{is_fresh, is_fresh_age, CacheEntry, CacheEntryInfo, CacheLookup, CacheStore};

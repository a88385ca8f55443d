//! Databridge
//!
//! Named datasources with a TTL-based JSON disk cache in front of their fetch
//! functions. Register [`Datasource`]s on a [`Databridge`], then fetch by name:
//! fresh cache entries are served from disk, everything else goes through the
//! source's fetcher and is written back for later calls.
//!
//! ```no_run
//! use databridge::{Databridge, DatabridgeOptions, Datasource, FetchOptions};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let bridge = Databridge::new(DatabridgeOptions::default())?;
//! bridge.register(Datasource::from_async("beaches", |_params| async {
//!     Ok::<_, std::io::Error>(json!(["kitsilano", "english-bay"]))
//! })?)?;
//!
//! let response = bridge.fetch_response("beaches", FetchOptions::new(), vec![])?;
//! let _data = response.data().await?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod cache;
pub mod cli;
pub mod datasource;
pub mod error;
mod pipeline;
pub mod request;
pub mod response;
pub mod timestamp;
pub mod validate;

pub use bridge::{Databridge, DatabridgeOptions, SourceShortcut};
pub use cache::CacheStore;
pub use datasource::{Datasource, DatasourceOptions, FetchOutcome, Fetcher};
pub use error::{DataError, DatabridgeError, FetchFailure, ValidationError};
pub use request::{CachePolicy, FetchOptions, FetchRequest};
pub use response::{CacheRead, CacheWrite, CacheWriteFailure, DataPromise, FetchResponse};

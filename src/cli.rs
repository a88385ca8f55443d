//! Command-line interface for inspecting a databridge cache directory
//!
//! This module handles parsing of CLI arguments using clap and runs the
//! maintenance commands (list, prune, clear, show) against a [`CacheStore`].

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::bridge::DEFAULT_CACHE_DIR;
use crate::cache::{is_fresh, CacheStore};
use crate::error::CacheError;
use crate::timestamp;
use crate::validate::{self, ValidationError};

/// Error types for the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// The TTL argument is not a positive integer
    #[error("Invalid TTL: '{0}'. Expected a positive number of seconds")]
    InvalidTtl(String),

    /// The requested cache entry does not exist
    #[error("Cache entry not found: {}", .0.display())]
    EntryNotFound(PathBuf),

    /// A cache operation failed
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// An argument failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The entry could not be rendered
    #[error("Failed to render cache entry: {0}")]
    Render(#[from] serde_json::Error),
}

/// Databridge cache maintenance
#[derive(Parser, Debug)]
#[command(name = "databridge")]
#[command(about = "Inspect and maintain a databridge JSON cache directory")]
#[command(version)]
pub struct Cli {
    /// Cache directory to operate on
    #[arg(long, global = true, value_name = "DIR", default_value = DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Cache maintenance commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List cache entries, oldest first
    List {
        /// Mark each entry fresh or stale against this TTL in seconds
        #[arg(long, value_parser = parse_ttl_arg)]
        ttl: Option<u64>,
    },
    /// Delete entries older than a TTL
    Prune {
        /// Maximum age in seconds of entries to keep
        #[arg(long, value_parser = parse_ttl_arg)]
        ttl: u64,
    },
    /// Delete every cache entry
    Clear,
    /// Print one cache entry
    Show {
        /// Entry file, either a path or a file name inside the cache directory
        file: PathBuf,
    },
}

/// Parses a TTL argument into a positive number of seconds.
///
/// # Returns
/// * `Ok(seconds)` if the string is a positive integer
/// * `Err(CliError::InvalidTtl)` otherwise
pub fn parse_ttl_arg(s: &str) -> Result<u64, CliError> {
    match s.trim().parse::<u64>() {
        Ok(seconds) if seconds > 0 => Ok(seconds),
        _ => Err(CliError::InvalidTtl(s.to_string())),
    }
}

impl Cli {
    /// Checks arguments that clap cannot
    ///
    /// `prune` and `clear` modify the cache directory, so it must already
    /// exist; `list` and `show` report a missing directory on their own.
    pub fn validate(&self) -> Result<(), CliError> {
        match self.command {
            Command::Prune { .. } | Command::Clear => {
                validate::directory_exists("cache_dir", &self.cache_dir)?;
            }
            Command::List { .. } | Command::Show { .. } => {}
        }
        Ok(())
    }
}

/// Runs the parsed command and returns the text to print
pub async fn execute(cli: &Cli) -> Result<String, CliError> {
    let store = CacheStore::new(cli.cache_dir.clone());
    let now = Utc::now();
    let mut out = String::new();

    match &cli.command {
        Command::List { ttl } => {
            let entries = store.list_entries(now).await?;
            if entries.is_empty() {
                let _ = writeln!(out, "No cache entries in {}", store.cache_dir().display());
            }
            for entry in entries {
                let name = file_name(&entry.path);
                let _ = write!(out, "{}\t{}\t{:.0}s", name, entry.timestamp, entry.age_seconds);
                if let Some(ttl) = ttl {
                    let fresh = timestamp::parse_iso8601(&entry.timestamp)
                        .is_some_and(|written_at| is_fresh(written_at, now, *ttl));
                    let _ = write!(out, "\t{}", if fresh { "fresh" } else { "stale" });
                }
                out.push('\n');
            }
        }
        Command::Prune { ttl } => {
            let removed = store.prune_expired(*ttl, now).await?;
            let _ = writeln!(out, "Removed {} expired cache entries", removed);
        }
        Command::Clear => {
            let removed = store.clear().await?;
            let _ = writeln!(out, "Removed {} cache entries", removed);
        }
        Command::Show { file } => {
            let path = resolve_entry_path(store.cache_dir(), file);
            let entry = store
                .read(&path)
                .await?
                .ok_or_else(|| CliError::EntryNotFound(path.clone()))?;
            out.push_str(&serde_json::to_string_pretty(&entry)?);
            out.push('\n');
        }
    }

    Ok(out)
}

/// Treats bare file names as relative to the cache directory
fn resolve_entry_path(cache_dir: &Path, file: &Path) -> PathBuf {
    if file.exists() || file.components().count() > 1 {
        file.to_path_buf()
    } else {
        cache_dir.join(file)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

//! Argument validation shared by the constructors
//!
//! Every check returns `Ok(())` or a [`ValidationError`] naming the offending
//! field, so constructors can chain them with `?`.

use std::path::Path;

use thiserror::Error;

use crate::timestamp;

/// A malformed constructor or method argument
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {field}: {message}")]
pub struct ValidationError {
    /// Name of the argument that failed validation
    pub field: String,
    /// What was wrong with it
    pub message: String,
}

impl ValidationError {
    /// Creates a validation error for the given field
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates the error reported when a required argument was never supplied
    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, "is required")
    }
}

/// Unwraps a required argument, failing if it is absent
pub fn required<T>(field: &str, value: Option<T>) -> Result<T, ValidationError> {
    value.ok_or_else(|| ValidationError::missing(field))
}

/// Ensures a string argument contains something other than whitespace
pub fn non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must be a non-empty string"));
    }
    Ok(())
}

/// Ensures a TTL in seconds is strictly positive
pub fn positive_ttl(field: &str, seconds: u64) -> Result<(), ValidationError> {
    if seconds == 0 {
        return Err(ValidationError::new(field, "must be a positive number of seconds"));
    }
    Ok(())
}

/// Ensures the path exists and is a directory
pub fn directory_exists(field: &str, path: &Path) -> Result<(), ValidationError> {
    if !path.is_dir() {
        return Err(ValidationError::new(
            field,
            format!("directory does not exist: {}", path.display()),
        ));
    }
    Ok(())
}

/// Ensures the string is a valid ISO-8601 timestamp
pub fn iso8601(field: &str, value: &str) -> Result<(), ValidationError> {
    if timestamp::parse_iso8601(value).is_none() {
        return Err(ValidationError::new(
            field,
            format!("not a valid ISO-8601 timestamp: '{}'", value),
        ));
    }
    Ok(())
}

//! Error types for the settings watcher
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for watcher and store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the settings watcher
#[derive(Error, Debug)]
pub enum Error {
    /// Store lookup failed (distinct from "not found", which is `Ok(None)`)
    #[error("Settings store error: {0}")]
    Store(String),

    /// More than one settings object carries the same id
    #[error("Duplicate settings id: {0}")]
    DuplicateId(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors from file-backed stores
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The watcher has been disposed and accepts no further lifecycle calls
    #[error("Settings watcher has been disposed")]
    Disposed,

    /// A watcher was constructed outside of a Tokio runtime
    #[error("No Tokio runtime available to spawn the polling task")]
    NoRuntime,
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a duplicate id error
    pub fn duplicate_id(id: impl Into<String>) -> Self {
        Self::DuplicateId(id.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error describes a failed store lookup
    ///
    /// Classification helper for store implementations and callers. The
    /// polling loop retries every lookup error regardless.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::DuplicateId(_) | Self::Io(_) | Self::Json(_)
        )
    }
}

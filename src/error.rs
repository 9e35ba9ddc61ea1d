//! Application-wide error types.
//!
//! Library modules return the unified [`Error`] via `thiserror`, while
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! Containment policy: per-file errors ([`Error::Metadata`]) and per-root
//! errors are logged and skipped by the synchronizer; only caller-facing
//! query errors ([`Error::NotFound`]) propagate out of the catalog service.

use std::path::PathBuf;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Tag data could not be read from an audio file
    #[error("Metadata error for {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    /// Query by id with no matching row
    #[error("Not found: {0}")]
    NotFound(String),

    /// Watcher initialized twice; programming error, fail fast
    #[error("Watcher is already initialized")]
    AlreadyInitialized,

    /// File system watcher error
    #[error("Watch error: {0}")]
    Watch(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a metadata error.
    pub fn metadata(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

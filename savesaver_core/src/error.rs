//! Error types for savesaver_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using savesaver_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during registry, store, backup and restore operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An input had the wrong shape or type.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// An input had the right shape but was semantically invalid.
    #[error("Invalid value: {reason}")]
    InvalidValue { reason: String },

    /// A lookup missed.
    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },

    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// I/O error tied to a specific path.
    #[error("I/O error at {path}: {source}")]
    IoAt {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A single glob pattern could not be compiled.
    #[error("Invalid glob pattern {pattern:?}: {reason}")]
    Glob { pattern: String, reason: String },

    /// No file of a backup could be hashed and stored.
    #[error("Backup of {source_name}/{subpath} failed: {reason}")]
    BackupFailed {
        source_name: String,
        subpath: String,
        reason: String,
    },

    /// A backup references content that is not in the store.
    #[error("Missing content for key {key}")]
    MissingContent { key: String },

    /// A manifest document could not be parsed or written.
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// The configuration file is invalid.
    #[error("Invalid config at {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// Unsupported algorithm.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// The caller abandoned the operation.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create an InvalidArgument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create an InvalidValue error.
    pub fn invalid_value(reason: impl Into<String>) -> Self {
        Error::InvalidValue {
            reason: reason.into(),
        }
    }

    /// Create a NotFound error for the given kind of thing.
    pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            what,
            name: name.into(),
        }
    }

    /// Create an IoAt error.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::IoAt {
            path: path.into(),
            source,
        }
    }

    /// Create a Glob error.
    pub fn glob(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Glob {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Create a BackupFailed error.
    pub fn backup_failed(
        source_name: impl Into<String>,
        subpath: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::BackupFailed {
            source_name: source_name.into(),
            subpath: subpath.into(),
            reason: reason.into(),
        }
    }

    /// Create a MissingContent error.
    pub fn missing_content(key: impl Into<String>) -> Self {
        Error::MissingContent { key: key.into() }
    }

    /// Create a Config error.
    pub fn config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Config {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedAlgorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Error::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// True for lookup misses.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path/glob error
        match err.io_error() {
            Some(io_err) => Error::Io {
                source: std::io::Error::new(io_err.kind(), io_err.to_string()),
            },
            None => Error::Io {
                source: std::io::Error::other(err.to_string()),
            },
        }
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::InvalidArgument {
            reason: format!("invalid filter pattern: {}", err),
        }
    }
}

//! Error types for Tracemeter

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using Tracemeter's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Tracemeter operations
#[derive(Error, Debug)]
pub enum Error {
    /// Time range or day count rejected before any network call
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// A page of the remote API could not be fetched
    #[error("Failed to fetch page {page}: {cause}")]
    Fetch {
        /// 1-based page number that failed
        page: u32,
        /// Underlying transport failure
        #[source]
        cause: FetchError,
    },

    /// Export file could not be written
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        /// Destination path
        path: PathBuf,
        /// Underlying IO failure
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Notification delivery could not be set up
    #[error("Notification error: {0}")]
    Notification(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid range error
    pub fn invalid_range(msg: impl Into<String>) -> Self {
        Self::InvalidRange(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a write error for `path`
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

/// Failures reported by a [`Transport`](crate::fetch::Transport) for a single page
#[derive(Error, Debug)]
pub enum FetchError {
    /// Connection-level failure
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The request did not complete in time
    #[error("request timed out")]
    Timeout,

    /// The API answered 429
    #[error("rate limit exceeded")]
    RateLimited,

    /// The API answered with a non-success status
    #[error("API returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// The response could not be decoded or violated record invariants
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Create a malformed response error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Network(e)
        }
    }
}

//! Error types for index-auth
//!
//! Authentication outcomes (declined prompts, rejected credentials) are not
//! errors: they come back as ordinary responses so callers can branch on the
//! status code. Only transport, URL and configuration failures end up here.

use thiserror::Error;

/// Result type alias using index-auth's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// index-auth error types.
///
/// Messages never include credentials; URLs are redacted before they are
/// formatted into an error.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure (connection, timeout, oversized body).
    ///
    /// Surfaced unmodified from the [`Transport`](crate::Transport).
    #[error("network error: {0}")]
    Network(String),

    /// The URL could not be parsed or cannot carry an origin.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid session configuration.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error, e.g. while reading a configuration file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error for unexpected failures, such as a prompt task that
    /// panicked on the blocking pool.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

//! Error types for asset downloads.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while downloading an asset.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection refused, TLS, body transfer).
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The server answered with a body that is clearly not the asset.
    #[error("unexpected content type '{content_type}' downloading {url}")]
    UnexpectedContentType {
        /// The URL that was fetched.
        url: String,
        /// The Content-Type the server sent.
        content_type: String,
    },

    /// File system error during download (create, write, rename).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The asset URL is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The configured concurrency is outside the accepted range.
    #[error("invalid download concurrency {value}: must be between 1 and 100")]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
    },

    /// The shared HTTP client could not be constructed.
    #[error("download HTTP client could not be built: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Creates a network error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an unexpected content-type error.
    pub fn unexpected_content_type(url: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::UnexpectedContentType {
            url: url.into(),
            content_type: content_type.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

//! Error types for identifier resolution.

use thiserror::Error;

/// Errors that can occur during identifier resolution.
///
/// Per-strategy failures are swallowed inside the resolution loop; only
/// [`AllStrategiesFailed`] escapes it, and even that is item-scoped.
///
/// [`AllStrategiesFailed`]: ResolveError::AllStrategiesFailed
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Every strategy in the fixed order was exhausted for this skeleton.
    #[error("all {tried} resolution strategies failed for reference #{index}")]
    AllStrategiesFailed {
        /// Skeleton index the failure belongs to.
        index: usize,
        /// How many strategies were attempted.
        tried: usize,
    },

    /// A strategy's page fetch returned a non-success status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The candidate link that was fetched.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// A strategy's page fetch failed at the transport level.
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The candidate link that was fetched.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The shared HTTP client could not be constructed.
    #[error("resolver HTTP client could not be built: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl ResolveError {
    /// Creates an all-strategies-failed error for a skeleton.
    #[must_use]
    pub fn all_strategies_failed(index: usize, tried: usize) -> Self {
        Self::AllStrategiesFailed { index, tried }
    }

    /// Creates an HTTP status error.
    #[must_use]
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_strategies_failed_display() {
        let err = ResolveError::all_strategies_failed(7, 4);
        let msg = err.to_string();
        assert!(msg.contains("#7"), "Expected index in: {msg}");
        assert!(msg.contains('4'), "Expected strategy count in: {msg}");
    }

    #[test]
    fn test_http_status_display() {
        let err = ResolveError::http_status("https://example.com/x", 503);
        assert!(err.to_string().contains("503"));
    }
}

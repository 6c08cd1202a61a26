//! Error types for metadata enrichment.

use thiserror::Error;

/// Errors that can occur while enriching a resolved identifier.
///
/// All variants except the constructor errors are item-scoped: they mark a
/// single record `EnrichmentFailed` and never abort the batch.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// The metadata API returned a non-success status.
    #[error("metadata API returned HTTP {status} for {doi}: {reason}")]
    HttpStatus {
        /// The identifier being enriched.
        doi: String,
        /// The HTTP status code.
        status: u16,
        /// Human-readable interpretation of the status.
        reason: String,
    },

    /// The request failed at the transport level.
    #[error("network error querying metadata for {doi}: {source}")]
    Network {
        /// The identifier being enriched.
        doi: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The response body did not match the expected shape.
    #[error("unexpected metadata payload for {doi}: {reason}")]
    Payload {
        /// The identifier being enriched.
        doi: String,
        /// What was wrong with the payload.
        reason: String,
    },

    /// The shared HTTP client could not be constructed.
    #[error("enricher HTTP client could not be built: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// The configured contact email contains control characters.
    #[error("mailto contains invalid control characters")]
    InvalidMailto,
}

impl EnrichError {
    /// Creates an HTTP status error with a reason derived from the code.
    #[must_use]
    pub fn http_status(doi: impl Into<String>, status: u16) -> Self {
        let reason = match status {
            404 => "DOI not found in the metadata index".to_string(),
            429 => "metadata API rate limit exceeded".to_string(),
            s if s >= 500 => "metadata API unavailable".to_string(),
            s => format!("metadata API returned HTTP {s}"),
        };
        Self::HttpStatus {
            doi: doi.into(),
            status,
            reason,
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(doi: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            doi: doi.into(),
            source,
        }
    }

    /// Creates a payload error.
    #[must_use]
    pub fn payload(doi: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Payload {
            doi: doi.into(),
            reason: reason.into(),
        }
    }
}

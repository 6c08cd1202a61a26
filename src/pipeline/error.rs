//! Run-scoped pipeline errors.
//!
//! Only precondition failures surface here; everything that happens after
//! extraction begins is item-scoped and lives inside the returned run.

use thiserror::Error;

/// Fatal, run-scoped errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The document URL is missing or not a parseable URL.
    #[error("document URL is missing or invalid: '{url}'")]
    InvalidDocumentUrl {
        /// The offending input.
        url: String,
    },

    /// The run was cancelled before any phase could start.
    #[error("run cancelled before extraction started")]
    CancelledBeforeStart,

    /// A phase component could not be constructed.
    #[error("pipeline setup failed: {reason}")]
    Setup {
        /// What went wrong during construction.
        reason: String,
    },
}

impl PipelineError {
    /// Creates an invalid-URL error.
    #[must_use]
    pub fn invalid_document_url(url: impl Into<String>) -> Self {
        Self::InvalidDocumentUrl { url: url.into() }
    }

    /// Creates a setup error from a component construction failure.
    #[must_use]
    pub fn setup(error: impl std::fmt::Display) -> Self {
        Self::Setup {
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_document_url_display() {
        let err = PipelineError::invalid_document_url("");
        assert!(err.to_string().contains("missing or invalid"));
    }
}

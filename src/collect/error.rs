//! Error types for reference extraction.

use thiserror::Error;

use crate::render::RenderError;

/// Errors that can occur while extracting reference skeletons.
///
/// These never propagate past the collection phase; the orchestrator folds
/// them into run statistics and continues with an empty reference list.
#[derive(Debug, Error)]
pub enum CollectError {
    /// The references container never appeared within the bounded wait.
    #[error("references container not found within {waited_ms} ms on {url}")]
    ContainerNotFound {
        /// The document URL being collected.
        url: String,
        /// How long the collector polled before giving up.
        waited_ms: u128,
    },

    /// The rendering capability failed mid-extraction.
    #[error("render capability failed during extraction: {0}")]
    Render(#[from] RenderError),
}

impl CollectError {
    /// Creates a container-not-found error.
    #[must_use]
    pub fn container_not_found(url: impl Into<String>, waited_ms: u128) -> Self {
        Self::ContainerNotFound {
            url: url.into(),
            waited_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_not_found_display() {
        let err = CollectError::container_not_found("https://example.com/doc", 5000);
        let msg = err.to_string();
        assert!(msg.contains("not found"), "Expected 'not found' in: {msg}");
        assert!(msg.contains("5000"), "Expected wait time in: {msg}");
        assert!(msg.contains("https://example.com/doc"), "Expected URL in: {msg}");
    }
}

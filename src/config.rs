//! Pipeline configuration.
//!
//! A single [`PipelineConfig`] value is constructed by the caller and passed
//! into the orchestrator, which hands the relevant pieces to each phase.
//! No component reads ambient global state.

use std::path::PathBuf;
use std::time::Duration;

use crate::fetch::{DEFAULT_DOWNLOAD_CONCURRENCY, DEFAULT_MAX_RETRIES};

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base URL of the Crossref-compatible metadata API.
    pub crossref_base_url: String,
    /// Base URL of the Unpaywall-compatible open-access lookup API.
    pub oa_base_url: String,
    /// Contact email sent to both APIs (Crossref polite pool).
    pub mailto: String,
    /// Directory where downloaded assets land.
    pub download_dir: PathBuf,
    /// When set, the collector persists raw rendered markup here for
    /// diagnosis. Best-effort; never affects correctness.
    pub capture_dir: Option<PathBuf>,
    /// How long the collector waits for the references container to appear.
    pub container_wait: Duration,
    /// Poll interval while waiting for the references container.
    pub container_poll_interval: Duration,
    /// In-flight cap for identifier resolution requests.
    pub resolve_concurrency: usize,
    /// In-flight cap for metadata enrichment requests.
    pub enrich_concurrency: usize,
    /// In-flight cap for asset downloads.
    pub download_concurrency: usize,
    /// Maximum download attempts per asset (including the first).
    pub max_retries: u32,
    /// Overall timeout applied to each HTTP request.
    pub http_timeout: Duration,
    /// Capacity of the progress event channel.
    pub progress_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            crossref_base_url: "https://api.crossref.org".to_string(),
            oa_base_url: "https://api.unpaywall.org".to_string(),
            mailto: "refpipe@example.com".to_string(),
            download_dir: PathBuf::from("downloads"),
            capture_dir: None,
            container_wait: Duration::from_secs(10),
            container_poll_interval: Duration::from_millis(250),
            resolve_concurrency: 4,
            enrich_concurrency: 4,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            http_timeout: Duration::from_secs(30),
            progress_buffer: 64,
        }
    }
}

impl PipelineConfig {
    /// Returns the default configuration with the given contact email.
    #[must_use]
    pub fn with_mailto(mailto: impl Into<String>) -> Self {
        Self {
            mailto: mailto.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_concurrency_bounds_are_small() {
        let config = PipelineConfig::default();
        assert_eq!(config.download_concurrency, 5);
        assert!(config.resolve_concurrency <= 8);
        assert!(config.enrich_concurrency <= 8);
    }

    #[test]
    fn test_with_mailto_overrides_only_mailto() {
        let config = PipelineConfig::with_mailto("librarian@example.org");
        assert_eq!(config.mailto, "librarian@example.org");
        assert_eq!(config.crossref_base_url, "https://api.crossref.org");
    }
}

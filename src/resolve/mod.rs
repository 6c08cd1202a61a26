//! Identifier resolution: skeleton in, canonical DOI out.
//!
//! Strategies are a fixed ordered list of tagged variants, tried until one
//! produces a valid identifier. Each strategy is independent: a failure is
//! logged and the next strategy always runs. Adding a strategy means
//! extending [`Strategy`] and [`Strategy::ORDER`], nothing else.

mod error;

pub use error::ResolveError;

use std::collections::BTreeMap;
use std::fmt;

use futures_util::{StreamExt, stream};
use reqwest::Client;
use tracing::{debug, info, instrument};

use crate::collect::{LinkCategory, ReferenceSkeleton};
use crate::config::PipelineConfig;
use crate::doi;
use crate::http;
use crate::pipeline::CancelToken;

/// A resolution strategy, in contract priority order.
///
/// The Crossref-landing-first order is the documented contract; it is kept
/// in one place ([`Strategy::ORDER`]) so tuning it is a one-line change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strategy {
    /// Fetch the Crossref landing link; meta tags first, then body scan.
    CrossrefLanding,
    /// Fetch the view-article link; scan the body for a DOI token.
    ViewArticle,
    /// Fetch the scholar link; citation meta tags only.
    Scholar,
    /// Scan the skeleton's own captured text.
    RawText,
}

impl Strategy {
    /// Fixed attempt order; first success wins.
    pub const ORDER: [Self; 4] = [
        Self::CrossrefLanding,
        Self::ViewArticle,
        Self::Scholar,
        Self::RawText,
    ];

    /// Short name used in logs and statistics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::CrossrefLanding => "crossref-landing",
            Self::ViewArticle => "view-article",
            Self::Scholar => "scholar",
            Self::RawText => "raw-text",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A skeleton resolved to a canonical DOI. Immutable once created; a DOI is
/// never overwritten once assigned to an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentifier {
    /// Join key back to the originating skeleton.
    pub skeleton_index: usize,
    /// Canonical, validated DOI.
    pub doi: String,
    /// The strategy that produced the identifier.
    pub strategy: Strategy,
}

/// Resolves skeletons to DOIs through the ordered strategy fallback.
pub struct StrategyResolver {
    client: Client,
    concurrency: usize,
}

impl StrategyResolver {
    /// Creates a resolver from the pipeline configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::ClientBuild`] if HTTP client construction
    /// fails.
    pub fn new(config: &PipelineConfig) -> Result<Self, ResolveError> {
        let client = http::build_client(config.http_timeout)
            .map_err(|source| ResolveError::ClientBuild { source })?;
        Ok(Self {
            client,
            concurrency: config.resolve_concurrency.max(1),
        })
    }

    /// Resolves one skeleton, trying strategies in [`Strategy::ORDER`].
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::AllStrategiesFailed`] when every strategy is
    /// exhausted. Per-strategy failures never escape this method.
    #[instrument(skip(self, skeleton), fields(index = skeleton.index))]
    pub async fn resolve(
        &self,
        skeleton: &ReferenceSkeleton,
    ) -> Result<ResolvedIdentifier, ResolveError> {
        for strategy in Strategy::ORDER {
            match self.attempt(strategy, skeleton).await {
                Ok(Some(doi)) => {
                    info!(
                        index = skeleton.index,
                        strategy = %strategy,
                        doi = %doi,
                        "identifier resolved"
                    );
                    return Ok(ResolvedIdentifier {
                        skeleton_index: skeleton.index,
                        doi,
                        strategy,
                    });
                }
                Ok(None) => {
                    debug!(
                        index = skeleton.index,
                        strategy = %strategy,
                        "strategy produced no identifier"
                    );
                }
                Err(error) => {
                    debug!(
                        index = skeleton.index,
                        strategy = %strategy,
                        error = %error,
                        "strategy failed, trying next"
                    );
                }
            }
        }
        Err(ResolveError::all_strategies_failed(
            skeleton.index,
            Strategy::ORDER.len(),
        ))
    }

    /// Resolves a batch under the phase-local concurrency bound,
    /// reassembled by skeleton index. Items not started before
    /// cancellation are absent from the result.
    #[instrument(skip_all, fields(count = skeletons.len()))]
    pub async fn resolve_all(
        &self,
        skeletons: &[ReferenceSkeleton],
        cancel: &CancelToken,
    ) -> BTreeMap<usize, Result<ResolvedIdentifier, ResolveError>> {
        stream::iter(skeletons.iter().map(|skeleton| async move {
            if cancel.is_cancelled() {
                return None;
            }
            Some((skeleton.index, self.resolve(skeleton).await))
        }))
        .buffer_unordered(self.concurrency)
        .filter_map(|item| async move { item })
        .collect()
        .await
    }

    /// Runs one strategy. `Ok(None)` means the strategy had nothing to work
    /// with or found no valid candidate; `Err` means it tried and broke.
    async fn attempt(
        &self,
        strategy: Strategy,
        skeleton: &ReferenceSkeleton,
    ) -> Result<Option<String>, ResolveError> {
        if strategy == Strategy::RawText {
            return Ok(doi::extract(&skeleton.resolution_text()));
        }

        let Some(url) = link_for(skeleton, strategy) else {
            return Ok(None);
        };
        let body = self.fetch_page(url).await?;

        let candidate = match strategy {
            Strategy::CrossrefLanding => {
                doi::extract_from_meta(&body).or_else(|| doi::extract(&body))
            }
            Strategy::ViewArticle => doi::extract(&body),
            Strategy::Scholar | Strategy::RawText => doi::extract_from_meta(&body),
        };
        Ok(candidate)
    }

    async fn fetch_page(&self, url: &str) -> Result<String, ResolveError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ResolveError::network(url, source))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::http_status(url, status.as_u16()));
        }
        response
            .text()
            .await
            .map_err(|source| ResolveError::network(url, source))
    }
}

impl fmt::Debug for StrategyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyResolver")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

/// The candidate link a networked strategy operates on, if the skeleton
/// carries one.
fn link_for(skeleton: &ReferenceSkeleton, strategy: Strategy) -> Option<&str> {
    let category = match strategy {
        Strategy::CrossrefLanding => LinkCategory::CrossrefLanding,
        Strategy::ViewArticle => LinkCategory::ViewArticle,
        Strategy::Scholar => LinkCategory::ScholarProfile,
        Strategy::RawText => return None,
    };
    skeleton.link(category)
}

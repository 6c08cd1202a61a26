//! Run state: per-index results, aggregate counters, and the phase machine.

use std::collections::BTreeMap;

use crate::collect::ReferenceSkeleton;
use crate::enrich::{EnrichedRecord, RecordStatus};
use crate::fetch::{AssetOutcome, AssetStatus};
use crate::resolve::{ResolvedIdentifier, Strategy};

/// Phase machine of a run. Transitions happen only after the prior phase
/// has processed its full input set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Created, no phase entered yet.
    NotStarted,
    /// Extracting reference skeletons.
    Extracting,
    /// Resolving identifiers.
    Resolving,
    /// Enriching resolved identifiers.
    Enriching,
    /// Acquiring assets.
    Fetching,
    /// All phases ran to completion.
    Completed,
    /// The run was cancelled; accumulated state is still valid.
    Cancelled,
}

/// Aggregate per-phase counters, mutated only by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Skeletons extracted.
    pub found: usize,
    /// Whether the references container was never located.
    pub extraction_failed: bool,
    /// Successful resolutions per strategy.
    pub resolved_by_strategy: BTreeMap<Strategy, usize>,
    /// Skeletons whose strategies were all exhausted.
    pub resolution_failed: usize,
    /// Records successfully enriched.
    pub enriched: usize,
    /// Records whose metadata lookup failed.
    pub enrichment_failed: usize,
    /// Assets downloaded.
    pub downloaded: usize,
    /// Asset downloads that failed after retries.
    pub download_failed: usize,
    /// Records skipped as not legally downloadable.
    pub download_skipped: usize,
}

impl RunStats {
    /// Successful resolutions across all strategies.
    #[must_use]
    pub fn resolved_total(&self) -> usize {
        self.resolved_by_strategy.values().sum()
    }

    /// Successful resolutions for one strategy.
    #[must_use]
    pub fn resolved_by(&self, strategy: Strategy) -> usize {
        self.resolved_by_strategy.get(&strategy).copied().unwrap_or(0)
    }
}

/// Everything known about one reference at the end of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemStatus {
    /// Extracted, but the run never got further for this index.
    Extracted,
    /// Every resolution strategy was exhausted.
    ResolutionFailed {
        /// The recorded failure description.
        reason: String,
    },
    /// A DOI was assigned, but enrichment never ran for this index.
    Resolved {
        /// The strategy that produced the identifier.
        strategy: Strategy,
    },
    /// The metadata lookup failed.
    EnrichmentFailed,
    /// Enriched, but acquisition never ran for this index.
    Enriched,
    /// The asset was downloaded.
    Downloaded,
    /// The asset was skipped.
    DownloadSkipped {
        /// Why it was skipped.
        reason: String,
    },
    /// The asset download failed.
    DownloadFailed {
        /// The final error description.
        reason: String,
    },
}

/// The accumulated result of one pipeline run.
///
/// Owned exclusively by the orchestrator while running; returned whole even
/// when some or all items failed. The skeleton index joins every map.
#[derive(Debug)]
pub struct PipelineRun {
    /// The document the run was started for.
    pub document_url: String,
    /// Where the phase machine ended up.
    pub state: RunState,
    /// All extracted skeletons, in document order.
    pub skeletons: Vec<ReferenceSkeleton>,
    /// Resolved identifiers by skeleton index.
    pub resolved: BTreeMap<usize, ResolvedIdentifier>,
    /// Recorded resolution failures by skeleton index.
    pub resolution_failures: BTreeMap<usize, String>,
    /// Enriched records by skeleton index.
    pub records: BTreeMap<usize, EnrichedRecord>,
    /// Asset outcomes by skeleton index.
    pub outcomes: BTreeMap<usize, AssetOutcome>,
    /// Aggregate counters.
    pub stats: RunStats,
}

impl PipelineRun {
    /// Creates an empty run for a document.
    #[must_use]
    pub fn new(document_url: impl Into<String>) -> Self {
        Self {
            document_url: document_url.into(),
            state: RunState::NotStarted,
            skeletons: Vec::new(),
            resolved: BTreeMap::new(),
            resolution_failures: BTreeMap::new(),
            records: BTreeMap::new(),
            outcomes: BTreeMap::new(),
            stats: RunStats::default(),
        }
    }

    /// Answers "what happened to reference #i" for any collected index.
    ///
    /// Returns `None` only for indices that were never extracted; every
    /// collected index has an explicit status, even on total failure.
    #[must_use]
    pub fn item_status(&self, index: usize) -> Option<ItemStatus> {
        if !self.skeletons.iter().any(|s| s.index == index) {
            return None;
        }
        if let Some(outcome) = self.outcomes.get(&index) {
            return Some(match &outcome.status {
                AssetStatus::Downloaded => ItemStatus::Downloaded,
                AssetStatus::Skipped { reason } => ItemStatus::DownloadSkipped {
                    reason: reason.clone(),
                },
                AssetStatus::Failed { reason } => ItemStatus::DownloadFailed {
                    reason: reason.clone(),
                },
            });
        }
        if let Some(record) = self.records.get(&index) {
            return Some(match record.status {
                RecordStatus::EnrichmentFailed => ItemStatus::EnrichmentFailed,
                _ => ItemStatus::Enriched,
            });
        }
        if let Some(resolved) = self.resolved.get(&index) {
            return Some(ItemStatus::Resolved {
                strategy: resolved.strategy,
            });
        }
        if let Some(reason) = self.resolution_failures.get(&index) {
            return Some(ItemStatus::ResolutionFailed {
                reason: reason.clone(),
            });
        }
        Some(ItemStatus::Extracted)
    }
}

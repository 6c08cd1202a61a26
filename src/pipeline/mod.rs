//! Pipeline orchestration.
//!
//! The orchestrator owns the phase machine and the only shared mutable
//! state of a run: the counters. Phases hand back per-item outcomes; the
//! orchestrator folds them in from a single coordination point, emits
//! progress events, and always returns the accumulated [`PipelineRun`],
//! even when every item failed.

mod cancel;
mod error;
mod events;
mod run;

pub use cancel::CancelToken;
pub use error::PipelineError;
pub use events::{EventOutcome, Phase, ProgressEvent, ProgressSink};
pub use run::{ItemStatus, PipelineRun, RunState, RunStats};

use std::sync::Arc;

use tracing::{info, instrument, warn};
use url::Url;

use crate::collect::SkeletonCollector;
use crate::config::PipelineConfig;
use crate::enrich::{MetadataEnricher, RecordStatus};
use crate::fetch::{AssetFetcher, AssetStatus};
use crate::render::Renderer;
use crate::resolve::{ResolvedIdentifier, StrategyResolver};

/// Sequences the four phases for one document.
pub struct Pipeline {
    config: PipelineConfig,
    renderer: Arc<dyn Renderer>,
    progress: ProgressSink,
    collector: SkeletonCollector,
    resolver: StrategyResolver,
    enricher: MetadataEnricher,
    fetcher: AssetFetcher,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Builds a pipeline from its configuration, rendering capability, and
    /// progress sink.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Setup`] when a phase component cannot be
    /// constructed (bad mailto, out-of-range concurrency).
    pub fn new(
        config: PipelineConfig,
        renderer: Arc<dyn Renderer>,
        progress: ProgressSink,
    ) -> Result<Self, PipelineError> {
        let collector = SkeletonCollector::new(&config);
        let resolver = StrategyResolver::new(&config).map_err(PipelineError::setup)?;
        let enricher = MetadataEnricher::new(&config).map_err(PipelineError::setup)?;
        let fetcher = AssetFetcher::new(&config).map_err(PipelineError::setup)?;
        Ok(Self {
            config,
            renderer,
            progress,
            collector,
            resolver,
            enricher,
            fetcher,
        })
    }

    /// Builds a pipeline with a bounded progress channel sized from the
    /// configuration, handing back the receiving side for the observer.
    ///
    /// # Errors
    ///
    /// Same as [`Pipeline::new`].
    pub fn with_observer(
        config: PipelineConfig,
        renderer: Arc<dyn Renderer>,
    ) -> Result<(Self, tokio::sync::mpsc::Receiver<ProgressEvent>), PipelineError> {
        let (sink, receiver) = ProgressSink::channel(config.progress_buffer);
        Ok((Self::new(config, renderer, sink)?, receiver))
    }

    /// Runs all four phases for a document.
    ///
    /// Individual item failures never abort the run; the returned
    /// [`PipelineRun`] enumerates every collected index with an explicit
    /// status. On cancellation the run comes back in
    /// [`RunState::Cancelled`] with whatever was accumulated.
    ///
    /// # Errors
    ///
    /// Only run-scoped precondition failures: an unusable document URL, or
    /// cancellation before extraction starts.
    #[instrument(skip(self, cancel))]
    pub async fn run(
        &self,
        document_url: &str,
        cancel: &CancelToken,
    ) -> Result<PipelineRun, PipelineError> {
        let document_url = document_url.trim();
        if document_url.is_empty() || Url::parse(document_url).is_err() {
            return Err(PipelineError::invalid_document_url(document_url));
        }
        if cancel.is_cancelled() {
            return Err(PipelineError::CancelledBeforeStart);
        }

        let mut run = PipelineRun::new(document_url);

        self.extract(&mut run, document_url).await;
        if cancel.is_cancelled() {
            return Ok(self.finish(run, true));
        }

        self.resolve(&mut run, cancel).await;
        if cancel.is_cancelled() {
            return Ok(self.finish(run, true));
        }

        self.enrich(&mut run, cancel).await;
        if cancel.is_cancelled() {
            return Ok(self.finish(run, true));
        }

        self.fetch(&mut run, cancel).await;
        Ok(self.finish(run, cancel.is_cancelled()))
    }

    async fn extract(&self, run: &mut PipelineRun, document_url: &str) {
        run.state = RunState::Extracting;
        self.progress.emit(ProgressEvent::phase_started(
            Phase::Extracting,
            format!("extracting references from {document_url}"),
        ));

        match self.collector.collect(self.renderer.as_ref(), document_url).await {
            Ok(skeletons) => {
                run.stats.found = skeletons.len();
                for skeleton in &skeletons {
                    self.progress.emit(ProgressEvent::item(
                        Phase::Extracting,
                        skeleton.index,
                        EventOutcome::Succeeded,
                        skeleton.raw_title.clone(),
                    ));
                }
                run.skeletons = skeletons;
            }
            Err(error) => {
                warn!(error = %error, "extraction failed; continuing with empty reference list");
                run.stats.extraction_failed = true;
                self.progress
                    .emit(ProgressEvent::phase_failed(Phase::Extracting, error.to_string()));
            }
        }
    }

    async fn resolve(&self, run: &mut PipelineRun, cancel: &CancelToken) {
        run.state = RunState::Resolving;
        self.progress.emit(ProgressEvent::phase_started(
            Phase::Resolving,
            format!("resolving {} references", run.skeletons.len()),
        ));

        let results = self.resolver.resolve_all(&run.skeletons, cancel).await;
        for (index, result) in results {
            match result {
                Ok(resolved) => {
                    *run.stats
                        .resolved_by_strategy
                        .entry(resolved.strategy)
                        .or_default() += 1;
                    self.progress.emit(ProgressEvent::item(
                        Phase::Resolving,
                        index,
                        EventOutcome::Succeeded,
                        format!("{} via {}", resolved.doi, resolved.strategy),
                    ));
                    run.resolved.insert(index, resolved);
                }
                Err(error) => {
                    run.stats.resolution_failed += 1;
                    self.progress.emit(ProgressEvent::item(
                        Phase::Resolving,
                        index,
                        EventOutcome::Failed,
                        error.to_string(),
                    ));
                    run.resolution_failures.insert(index, error.to_string());
                }
            }
        }
    }

    async fn enrich(&self, run: &mut PipelineRun, cancel: &CancelToken) {
        run.state = RunState::Enriching;
        self.progress.emit(ProgressEvent::phase_started(
            Phase::Enriching,
            format!("enriching {} identifiers", run.resolved.len()),
        ));

        let resolved: Vec<ResolvedIdentifier> = run.resolved.values().cloned().collect();
        let enriched = self
            .enricher
            .enrich_all(&resolved, &mut run.records, cancel)
            .await;
        run.stats.enriched = enriched;
        run.stats.enrichment_failed = run
            .records
            .values()
            .filter(|record| record.status == RecordStatus::EnrichmentFailed)
            .count();

        for (&index, record) in &run.records {
            let (outcome, message) = match record.status {
                RecordStatus::EnrichmentFailed => {
                    (EventOutcome::Failed, "metadata lookup failed".to_string())
                }
                _ => (EventOutcome::Succeeded, record.title.clone()),
            };
            self.progress
                .emit(ProgressEvent::item(Phase::Enriching, index, outcome, message));
        }
    }

    async fn fetch(&self, run: &mut PipelineRun, cancel: &CancelToken) {
        run.state = RunState::Fetching;

        // Only indices with enriched state move forward.
        let eligible: std::collections::BTreeMap<_, _> = run
            .records
            .iter()
            .filter(|(_, record)| record.status == RecordStatus::Enriched)
            .map(|(&index, record)| (index, record.clone()))
            .collect();

        self.progress.emit(ProgressEvent::phase_started(
            Phase::Fetching,
            format!("fetching assets for {} records", eligible.len()),
        ));

        let outcomes = self
            .fetcher
            .fetch_all(&eligible, &self.config.download_dir, cancel)
            .await;

        for (&index, outcome) in &outcomes {
            let (event_outcome, message) = match &outcome.status {
                AssetStatus::Downloaded => {
                    run.stats.downloaded += 1;
                    (EventOutcome::Succeeded, format!("{} bytes", outcome.bytes_written))
                }
                AssetStatus::Skipped { reason } => {
                    run.stats.download_skipped += 1;
                    (EventOutcome::Skipped, reason.clone())
                }
                AssetStatus::Failed { reason } => {
                    run.stats.download_failed += 1;
                    (EventOutcome::Failed, reason.clone())
                }
            };
            self.progress.emit(ProgressEvent::item(
                Phase::Fetching,
                index,
                event_outcome,
                message,
            ));
        }
        run.outcomes = outcomes;
    }

    #[allow(clippy::unused_self)]
    fn finish(&self, mut run: PipelineRun, cancelled: bool) -> PipelineRun {
        run.state = if cancelled {
            RunState::Cancelled
        } else {
            RunState::Completed
        };
        info!(
            state = ?run.state,
            found = run.stats.found,
            resolved = run.stats.resolved_total(),
            resolution_failed = run.stats.resolution_failed,
            enriched = run.stats.enriched,
            enrichment_failed = run.stats.enrichment_failed,
            downloaded = run.stats.downloaded,
            download_failed = run.stats.download_failed,
            download_skipped = run.stats.download_skipped,
            "pipeline run finished"
        );
        run
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::render::FakeRenderer;

    fn pipeline() -> Pipeline {
        Pipeline::new(
            PipelineConfig::default(),
            Arc::new(FakeRenderer::new()),
            ProgressSink::disabled(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_rejects_empty_url() {
        let result = pipeline().run("", &CancelToken::new()).await;
        assert!(matches!(
            result,
            Err(PipelineError::InvalidDocumentUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_rejects_unparseable_url() {
        let result = pipeline().run("not a url", &CancelToken::new()).await;
        assert!(matches!(
            result,
            Err(PipelineError::InvalidDocumentUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_cancelled_before_start_is_fatal() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = pipeline().run("https://example.com/doc", &cancel).await;
        assert!(matches!(result, Err(PipelineError::CancelledBeforeStart)));
    }

    #[test]
    fn test_new_rejects_bad_mailto() {
        let config = PipelineConfig::with_mailto("bad\nmailto@example.com");
        let result = Pipeline::new(
            config,
            Arc::new(FakeRenderer::new()),
            ProgressSink::disabled(),
        );
        assert!(matches!(result, Err(PipelineError::Setup { .. })));
    }
}

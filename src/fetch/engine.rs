//! Bounded-concurrency asset downloads with retry and atomic destinations.
//!
//! The fetcher spawns one task per eligible record, gated by a semaphore so
//! at most `download_concurrency` transfers are in flight at any instant.
//! Bodies stream into a `.part` sibling that is renamed into place only on
//! success, so the final name is never partially visible.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::PipelineConfig;
use crate::enrich::{EnrichedRecord, RecordStatus};
use crate::http;
use crate::pipeline::CancelToken;

use super::error::FetchError;
use super::filename::asset_file_name;
use super::retry::{RetryDecision, RetryPolicy, classify_error};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default in-flight download cap; kept small to respect third-party
/// service limits.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 5;

/// Outcome status of one asset acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetStatus {
    /// The asset was downloaded to its destination.
    Downloaded,
    /// The record was not eligible; carries the reason.
    Skipped {
        /// Why the record was skipped (e.g. `not open access`).
        reason: String,
    },
    /// The download failed after all attempts; carries the reason.
    Failed {
        /// The final error description.
        reason: String,
    },
}

/// Result of one asset acquisition, joined back by skeleton index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetOutcome {
    /// The record's DOI.
    pub doi: String,
    /// Final destination path, present only when downloaded.
    pub destination: Option<PathBuf>,
    /// Bytes written to the destination.
    pub bytes_written: u64,
    /// What happened.
    pub status: AssetStatus,
}

impl AssetOutcome {
    fn downloaded(doi: impl Into<String>, destination: PathBuf, bytes_written: u64) -> Self {
        Self {
            doi: doi.into(),
            destination: Some(destination),
            bytes_written,
            status: AssetStatus::Downloaded,
        }
    }

    fn skipped(doi: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            doi: doi.into(),
            destination: None,
            bytes_written: 0,
            status: AssetStatus::Skipped {
                reason: reason.into(),
            },
        }
    }

    fn failed(doi: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            doi: doi.into(),
            destination: None,
            bytes_written: 0,
            status: AssetStatus::Failed {
                reason: reason.into(),
            },
        }
    }
}

/// Downloads assets for enriched records under a bounded worker pool.
pub struct AssetFetcher {
    client: Client,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    retry_policy: RetryPolicy,
}

impl AssetFetcher {
    /// Creates a fetcher from the pipeline configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidConcurrency`] when the configured cap is
    /// outside 1-100, and [`FetchError::ClientBuild`] if HTTP client
    /// construction fails.
    pub fn new(config: &PipelineConfig) -> Result<Self, FetchError> {
        let concurrency = config.download_concurrency;
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(FetchError::InvalidConcurrency { value: concurrency });
        }
        let client = http::build_client(config.http_timeout)
            .map_err(|source| FetchError::ClientBuild { source })?;
        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            retry_policy: RetryPolicy::with_max_attempts(config.max_retries),
        })
    }

    /// Replaces the retry policy (shorter delays in tests).
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Downloads assets for the given records, at most `concurrency` in
    /// flight at once.
    ///
    /// Individual failures and skips become [`AssetOutcome`] entries; the
    /// batch itself never fails. Records not started before cancellation
    /// are absent from the result.
    #[instrument(skip(self, records, cancel), fields(count = records.len(), out_dir = %out_dir.display()))]
    pub async fn fetch_all(
        &self,
        records: &BTreeMap<usize, EnrichedRecord>,
        out_dir: &Path,
        cancel: &CancelToken,
    ) -> BTreeMap<usize, AssetOutcome> {
        if let Err(error) = tokio::fs::create_dir_all(out_dir).await {
            warn!(error = %error, dir = %out_dir.display(), "could not create output directory");
        }

        let mut handles = Vec::new();
        for (&index, record) in records {
            if cancel.is_cancelled() {
                debug!(index, "cancelled before dispatching remaining downloads");
                break;
            }

            // Blocks while the pool is saturated (RAII permit).
            let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                break;
            };

            let client = self.client.clone();
            let retry_policy = self.retry_policy.clone();
            let record = record.clone();
            let out_dir = out_dir.to_path_buf();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                if cancel.is_cancelled() {
                    return None;
                }
                Some((index, fetch_asset(&client, &retry_policy, &record, &out_dir).await))
            }));
        }

        let mut outcomes = BTreeMap::new();
        for handle in handles {
            match handle.await {
                Ok(Some((index, outcome))) => {
                    outcomes.insert(index, outcome);
                }
                Ok(None) => {}
                Err(error) => warn!(error = %error, "download task panicked"),
            }
        }
        outcomes
    }
}

impl fmt::Debug for AssetFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetFetcher")
            .field("concurrency", &self.concurrency)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

/// The URL a record may legally be downloaded from, if any.
fn eligible_url(record: &EnrichedRecord) -> Option<&str> {
    if record.license_open {
        if let Some(url) = record.asset_url.as_deref() {
            return Some(url);
        }
    }
    record.fallback_asset_url.as_deref()
}

async fn fetch_asset(
    client: &Client,
    retry_policy: &RetryPolicy,
    record: &EnrichedRecord,
    out_dir: &Path,
) -> AssetOutcome {
    if record.status != RecordStatus::Enriched {
        return AssetOutcome::skipped(&record.doi, "not enriched");
    }
    let Some(url) = eligible_url(record) else {
        debug!(doi = %record.doi, "skipping asset: not open access");
        return AssetOutcome::skipped(&record.doi, "not open access");
    };

    let stem = asset_file_name(&record.doi);
    let destination = out_dir.join(format!("{stem}.pdf"));
    let part = out_dir.join(format!("{stem}.pdf.part"));

    match download_with_retry(client, retry_policy, url, &destination, &part).await {
        Ok(bytes_written) => {
            info!(
                doi = %record.doi,
                path = %destination.display(),
                bytes_written,
                "asset downloaded"
            );
            AssetOutcome::downloaded(&record.doi, destination, bytes_written)
        }
        Err((error, attempts)) => {
            warn!(
                doi = %record.doi,
                error = %error,
                attempts,
                "asset download failed after all attempts"
            );
            AssetOutcome::failed(&record.doi, error.to_string())
        }
    }
}

/// Downloads with the retry policy; returns the final error and the number
/// of attempts made when all of them fail.
async fn download_with_retry(
    client: &Client,
    retry_policy: &RetryPolicy,
    url: &str,
    destination: &Path,
    part: &Path,
) -> Result<u64, (FetchError, u32)> {
    let mut attempt: u32 = 1;
    loop {
        match download_once(client, url, destination, part).await {
            Ok(bytes) => return Ok(bytes),
            Err(error) => {
                let failure_type = classify_error(&error);
                match retry_policy.should_retry(failure_type, attempt) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next_attempt,
                    } => {
                        debug!(
                            url,
                            attempt,
                            delay_ms = delay.as_millis(),
                            error = %error,
                            "retrying download"
                        );
                        tokio::time::sleep(delay).await;
                        attempt = next_attempt;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(url, attempt, %reason, "not retrying download");
                        return Err((error, attempt));
                    }
                }
            }
        }
    }
}

/// One download attempt: stream into the `.part` file, rename on success.
/// The partial is removed on any failure so it never lingers.
async fn download_once(
    client: &Client,
    url: &str,
    destination: &Path,
    part: &Path,
) -> Result<u64, FetchError> {
    match stream_to_part(client, url, part).await {
        Ok(bytes) => match tokio::fs::rename(part, destination).await {
            Ok(()) => Ok(bytes),
            Err(source) => {
                let _ = tokio::fs::remove_file(part).await;
                Err(FetchError::io(destination, source))
            }
        },
        Err(error) => {
            let _ = tokio::fs::remove_file(part).await;
            Err(error)
        }
    }
}

async fn stream_to_part(client: &Client, url: &str, part: &Path) -> Result<u64, FetchError> {
    if Url::parse(url).is_err() {
        return Err(FetchError::invalid_url(url));
    }

    let response = client.get(url).send().await.map_err(|source| {
        if source.is_timeout() {
            FetchError::timeout(url)
        } else {
            FetchError::network(url, source)
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::http_status(url, status.as_u16()));
    }

    // An HTML body here is a paywall or viewer page, not the asset.
    if let Some(content_type) = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    {
        if content_type.trim_start().to_lowercase().starts_with("text/html") {
            return Err(FetchError::unexpected_content_type(url, content_type));
        }
    }

    let file = tokio::fs::File::create(part)
        .await
        .map_err(|source| FetchError::io(part, source))?;
    let mut writer = tokio::io::BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| {
            if source.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::network(url, source)
            }
        })?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|source| FetchError::io(part, source))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|source| FetchError::io(part, source))?;
    Ok(bytes_written)
}

//! Metadata enrichment: resolved DOI in, canonical record out.
//!
//! One authoritative metadata lookup per identifier, plus a secondary
//! open-access lookup for a fallback asset URL. Enrichment failures are
//! recorded on the individual record; the batch always runs to completion.

mod crossref;
mod error;
mod oa;

pub use error::EnrichError;

use std::collections::BTreeMap;
use std::fmt;

use futures_util::{StreamExt, stream};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::PipelineConfig;
use crate::http;
use crate::pipeline::CancelToken;
use crate::resolve::ResolvedIdentifier;

use crossref::{WorksMessage, WorksResponse, extract_year, first_text, format_authors,
    primary_asset_url};
use oa::{OaResponse, pick_pdf_url};

/// License URL prefixes accepted as legally redistributable.
///
/// The flag derived from this set is authoritative for whether the fetcher
/// may act on a record's primary asset URL.
pub const OPEN_LICENSE_PREFIXES: [&str; 4] = [
    "https://creativecommons.org/licenses/",
    "http://creativecommons.org/licenses/",
    "https://creativecommons.org/publicdomain/",
    "http://creativecommons.org/publicdomain/",
];

/// Enrichment state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Created, not yet enriched.
    Pending,
    /// Metadata lookup succeeded.
    Enriched,
    /// Metadata lookup failed; record carries only its DOI.
    EnrichmentFailed,
}

/// A resolved identifier enriched with authoritative metadata.
///
/// Mutated only by the enricher; the fetcher reads it as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    /// Canonical DOI.
    pub doi: String,
    /// Work title, empty when the source had none.
    pub title: String,
    /// Ordered author names as `"Given Family"`.
    pub authors: Vec<String>,
    /// Publication year when known.
    pub year: Option<i32>,
    /// Venue / container title.
    pub venue: String,
    /// Abstract text as served by the metadata source.
    pub abstract_text: String,
    /// Primary asset URL from the metadata source.
    pub asset_url: Option<String>,
    /// Direct open-access asset URL from the fallback lookup.
    pub fallback_asset_url: Option<String>,
    /// Whether the license metadata confirms open redistribution.
    pub license_open: bool,
    /// Enrichment outcome.
    pub status: RecordStatus,
}

impl EnrichedRecord {
    /// Creates an unenriched record for an identifier.
    #[must_use]
    pub fn pending(doi: impl Into<String>) -> Self {
        Self {
            doi: doi.into(),
            title: String::new(),
            authors: Vec::new(),
            year: None,
            venue: String::new(),
            abstract_text: String::new(),
            asset_url: None,
            fallback_asset_url: None,
            license_open: false,
            status: RecordStatus::Pending,
        }
    }
}

/// Returns true when a license URL belongs to the open prefix set.
pub(crate) fn is_open_license(url: &str) -> bool {
    OPEN_LICENSE_PREFIXES
        .iter()
        .any(|prefix| url.starts_with(prefix))
}

/// Enriches resolved identifiers via the metadata and open-access APIs.
pub struct MetadataEnricher {
    client: Client,
    crossref_base: String,
    oa_base: String,
    mailto: String,
    concurrency: usize,
}

impl MetadataEnricher {
    /// Creates an enricher from the pipeline configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::InvalidMailto`] when the contact email has
    /// control characters, and [`EnrichError::ClientBuild`] if HTTP client
    /// construction fails.
    pub fn new(config: &PipelineConfig) -> Result<Self, EnrichError> {
        if config
            .mailto
            .chars()
            .any(|c| c == '\n' || c == '\r' || c == '\0')
        {
            return Err(EnrichError::InvalidMailto);
        }
        let client = http::build_client(config.http_timeout)
            .map_err(|source| EnrichError::ClientBuild { source })?;
        Ok(Self {
            client,
            crossref_base: config.crossref_base_url.clone(),
            oa_base: config.oa_base_url.clone(),
            mailto: config.mailto.clone(),
            concurrency: config.enrich_concurrency.max(1),
        })
    }

    /// Enriches one identifier. Never fails; a lookup problem is recorded
    /// as [`RecordStatus::EnrichmentFailed`] on the returned record.
    #[instrument(skip(self, resolved), fields(doi = %resolved.doi))]
    pub async fn enrich(&self, resolved: &ResolvedIdentifier) -> EnrichedRecord {
        let mut record = EnrichedRecord::pending(&resolved.doi);

        match self.metadata_lookup(&resolved.doi).await {
            Ok(message) => {
                populate(&mut record, &message);
                record.status = RecordStatus::Enriched;
            }
            Err(error) => {
                warn!(doi = %resolved.doi, error = %error, "enrichment failed");
                record.status = RecordStatus::EnrichmentFailed;
                return record;
            }
        }

        // The fallback lookup is supplementary; its failure never demotes
        // an already-enriched record.
        match self.oa_lookup(&resolved.doi).await {
            Ok(Some(url)) => {
                debug!(doi = %resolved.doi, "open-access fallback URL found");
                record.fallback_asset_url = Some(url);
            }
            Ok(None) => {}
            Err(error) => {
                debug!(doi = %resolved.doi, error = %error, "open-access lookup failed");
            }
        }

        record
    }

    /// Enriches a batch under the phase-local concurrency bound, writing
    /// each record into `records` keyed by skeleton index.
    ///
    /// Returns the COUNT of successfully enriched records; per-record
    /// outcomes live in each record's `status`.
    #[instrument(skip_all, fields(count = resolved.len()))]
    pub async fn enrich_all(
        &self,
        resolved: &[ResolvedIdentifier],
        records: &mut BTreeMap<usize, EnrichedRecord>,
        cancel: &CancelToken,
    ) -> usize {
        let produced: Vec<(usize, EnrichedRecord)> =
            stream::iter(resolved.iter().map(|identifier| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                Some((identifier.skeleton_index, self.enrich(identifier).await))
            }))
            .buffer_unordered(self.concurrency)
            .filter_map(|item| async move { item })
            .collect()
            .await;

        let mut enriched = 0;
        for (index, record) in produced {
            if record.status == RecordStatus::Enriched {
                enriched += 1;
            }
            records.insert(index, record);
        }
        enriched
    }

    async fn metadata_lookup(&self, doi: &str) -> Result<WorksMessage, EnrichError> {
        let url = format!(
            "{}/works/{}?mailto={}",
            self.crossref_base,
            urlencoding::encode(doi),
            urlencoding::encode(&self.mailto)
        );
        debug!(api_url = %url, "querying metadata API");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| EnrichError::network(doi, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichError::http_status(doi, status.as_u16()));
        }

        let body: WorksResponse = response
            .json()
            .await
            .map_err(|source| EnrichError::payload(doi, source.to_string()))?;

        if !body.status.eq_ignore_ascii_case("ok") {
            return Err(EnrichError::payload(
                doi,
                format!("response status was '{}'", body.status),
            ));
        }
        Ok(body.message)
    }

    async fn oa_lookup(&self, doi: &str) -> Result<Option<String>, EnrichError> {
        let url = format!(
            "{}/v2/{}?email={}",
            self.oa_base,
            urlencoding::encode(doi),
            urlencoding::encode(&self.mailto)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| EnrichError::network(doi, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichError::http_status(doi, status.as_u16()));
        }

        let body: OaResponse = response
            .json()
            .await
            .map_err(|source| EnrichError::payload(doi, source.to_string()))?;
        Ok(pick_pdf_url(&body))
    }
}

impl fmt::Debug for MetadataEnricher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataEnricher")
            .field("crossref_base", &self.crossref_base)
            .field("oa_base", &self.oa_base)
            .field("mailto", &self.mailto)
            .finish_non_exhaustive()
    }
}

/// Copies the message fields onto the record, normalizing shapes.
fn populate(record: &mut EnrichedRecord, message: &WorksMessage) {
    record.title = first_text(message.title.as_ref());
    record.venue = first_text(message.container_title.as_ref());
    record.abstract_text = message.abstract_text.clone().unwrap_or_default();
    record.authors = format_authors(message.author.as_deref().unwrap_or(&[]));
    record.year = extract_year(message.published.as_ref())
        .or_else(|| extract_year(message.published_print.as_ref()))
        .or_else(|| extract_year(message.published_online.as_ref()));
    record.asset_url = primary_asset_url(message.link.as_deref().unwrap_or(&[]));
    record.license_open = message
        .license
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .any(|license| is_open_license(&license.url));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::resolve::Strategy;
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolved(index: usize, doi: &str) -> ResolvedIdentifier {
        ResolvedIdentifier {
            skeleton_index: index,
            doi: doi.to_string(),
            strategy: Strategy::CrossrefLanding,
        }
    }

    fn enricher_for(server: &MockServer) -> MetadataEnricher {
        let config = PipelineConfig {
            crossref_base_url: server.uri(),
            oa_base_url: server.uri(),
            ..PipelineConfig::default()
        };
        MetadataEnricher::new(&config).unwrap()
    }

    fn works_json() -> serde_json::Value {
        serde_json::json!({
            "status": "ok",
            "message": {
                "title": ["A Great Paper"],
                "container-title": ["IEEE Transactions on Things"],
                "abstract": "We study things.",
                "author": [
                    {"given": "John", "family": "Smith"},
                    {"given": "Jane", "family": "Doe"}
                ],
                "link": [{
                    "URL": "https://publisher.example/paper.pdf",
                    "content-type": "application/pdf"
                }],
                "license": [{"URL": "https://creativecommons.org/licenses/by/4.0/"}],
                "published": {"date-parts": [[2024, 6, 15]]}
            }
        })
    }

    async fn mount_closed_oa(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/v2/.+"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(server)
            .await;
    }

    // ==================== License Classification Tests ====================

    #[test]
    fn test_is_open_license_creative_commons() {
        assert!(is_open_license("https://creativecommons.org/licenses/by/4.0/"));
        assert!(is_open_license("http://creativecommons.org/publicdomain/zero/1.0/"));
    }

    #[test]
    fn test_is_open_license_rejects_publisher_licenses() {
        assert!(!is_open_license("https://publisher.example/tdm-license"));
        assert!(!is_open_license(""));
    }

    // ==================== Constructor Tests ====================

    #[test]
    fn test_new_rejects_mailto_with_control_characters() {
        let config = PipelineConfig::with_mailto("bad\nmailto@example.com");
        assert!(matches!(
            MetadataEnricher::new(&config),
            Err(EnrichError::InvalidMailto)
        ));
    }

    // ==================== Enrichment Tests ====================

    #[tokio::test]
    async fn test_enrich_populates_record_from_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works/10.1234%2Ftest"))
            .and(query_param("mailto", "refpipe@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(works_json()))
            .mount(&server)
            .await;
        mount_closed_oa(&server).await;

        let record = enricher_for(&server).enrich(&resolved(0, "10.1234/test")).await;

        assert_eq!(record.status, RecordStatus::Enriched);
        assert_eq!(record.title, "A Great Paper");
        assert_eq!(record.venue, "IEEE Transactions on Things");
        assert_eq!(record.abstract_text, "We study things.");
        assert_eq!(record.authors, vec!["John Smith", "Jane Doe"]);
        assert_eq!(record.year, Some(2024));
        assert_eq!(
            record.asset_url.as_deref(),
            Some("https://publisher.example/paper.pdf")
        );
        assert!(record.license_open);
        assert_eq!(record.fallback_asset_url, None);
    }

    #[tokio::test]
    async fn test_enrich_scalar_title_equals_list_title() {
        let server = MockServer::start().await;
        let scalar = serde_json::json!({
            "status": "ok",
            "message": { "title": "Example Title" }
        });
        Mock::given(method("GET"))
            .and(path("/works/10.1234%2Fscalar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(scalar))
            .mount(&server)
            .await;
        let list = serde_json::json!({
            "status": "ok",
            "message": { "title": ["Example Title"] }
        });
        Mock::given(method("GET"))
            .and(path("/works/10.1234%2Flist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(list))
            .mount(&server)
            .await;
        mount_closed_oa(&server).await;

        let enricher = enricher_for(&server);
        let from_scalar = enricher.enrich(&resolved(0, "10.1234/scalar")).await;
        let from_list = enricher.enrich(&resolved(1, "10.1234/list")).await;

        assert_eq!(from_scalar.title, "Example Title");
        assert_eq!(from_scalar.title, from_list.title);
    }

    #[tokio::test]
    async fn test_enrich_http_error_marks_record_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works/10.1234%2Fmissing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let record = enricher_for(&server)
            .enrich(&resolved(0, "10.1234/missing"))
            .await;
        assert_eq!(record.status, RecordStatus::EnrichmentFailed);
        assert_eq!(record.doi, "10.1234/missing");
        assert!(record.title.is_empty());
    }

    #[tokio::test]
    async fn test_enrich_oa_fallback_url_recorded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works/10.1234%2Foa"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "message": { "title": ["Closed Paper"] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/10.1234%2Foa"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "best_oa_location": { "url_for_pdf": "https://repo.example/oa.pdf" }
            })))
            .mount(&server)
            .await;

        let record = enricher_for(&server).enrich(&resolved(0, "10.1234/oa")).await;
        assert_eq!(record.status, RecordStatus::Enriched);
        assert_eq!(
            record.fallback_asset_url.as_deref(),
            Some("https://repo.example/oa.pdf")
        );
        assert!(!record.license_open);
    }

    #[tokio::test]
    async fn test_enrich_oa_failure_keeps_record_enriched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works/10.1234%2Fsturdy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(works_json()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v2/.+"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let record = enricher_for(&server)
            .enrich(&resolved(0, "10.1234/sturdy"))
            .await;
        assert_eq!(record.status, RecordStatus::Enriched);
        assert_eq!(record.fallback_asset_url, None);
    }

    #[tokio::test]
    async fn test_enrich_all_returns_success_count_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works/10.1234%2Fgood"))
            .respond_with(ResponseTemplate::new(200).set_body_json(works_json()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/works/10.1234%2Fbad"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        mount_closed_oa(&server).await;

        let mut records = BTreeMap::new();
        let count = enricher_for(&server)
            .enrich_all(
                &[resolved(0, "10.1234/good"), resolved(2, "10.1234/bad")],
                &mut records,
                &CancelToken::new(),
            )
            .await;

        assert_eq!(count, 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[&0].status, RecordStatus::Enriched);
        assert_eq!(records[&2].status, RecordStatus::EnrichmentFailed);
    }
}

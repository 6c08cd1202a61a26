//! Persisted record schema and atomic JSON storage.
//!
//! One [`PersistedRecord`] per reference is the minimal contract a storage
//! collaborator must accept. Writes go to a temporary sibling first and are
//! renamed into place, so a crash mid-write never corrupts the real file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::enrich::{EnrichedRecord, RecordStatus};
use crate::fetch::{AssetOutcome, AssetStatus};

/// Errors that can occur reading or writing persisted records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File system error.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The path being read or written.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file contents are not valid record JSON.
    #[error("invalid record JSON in {path}: {source}")]
    Json {
        /// The path being read or written.
        path: PathBuf,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

/// The JSON shape handed to the storage collaborator, one object per
/// record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// Canonical DOI.
    pub doi: String,
    /// Work title.
    pub title: String,
    /// Ordered author names.
    pub authors: Vec<String>,
    /// Publication year when known.
    pub year: Option<i32>,
    /// Venue / container title.
    pub venue: String,
    /// Abstract text.
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Path of the downloaded asset, when one exists.
    pub asset_path: Option<String>,
    /// Whether the license metadata confirmed open redistribution.
    pub license_open: bool,
    /// Enrichment outcome.
    pub status: RecordStatus,
}

impl PersistedRecord {
    /// Builds the persisted shape from a record and its asset outcome.
    #[must_use]
    pub fn from_record(record: &EnrichedRecord, outcome: Option<&AssetOutcome>) -> Self {
        let asset_path = outcome
            .filter(|o| o.status == AssetStatus::Downloaded)
            .and_then(|o| o.destination.as_ref())
            .map(|path| path.display().to_string());
        Self {
            doi: record.doi.clone(),
            title: record.title.clone(),
            authors: record.authors.clone(),
            year: record.year,
            venue: record.venue.clone(),
            abstract_text: record.abstract_text.clone(),
            asset_path,
            license_open: record.license_open,
            status: record.status,
        }
    }

    /// Reconstructs a record from the persisted shape.
    ///
    /// Asset URLs are not part of the schema and come back empty; every
    /// schema field round-trips exactly.
    #[must_use]
    pub fn into_record(self) -> EnrichedRecord {
        EnrichedRecord {
            doi: self.doi,
            title: self.title,
            authors: self.authors,
            year: self.year,
            venue: self.venue,
            abstract_text: self.abstract_text,
            asset_url: None,
            fallback_asset_url: None,
            license_open: self.license_open,
            status: self.status,
        }
    }
}

/// Atomically writes records as a JSON array.
///
/// # Errors
///
/// Returns [`StoreError::Io`] on file system failures and
/// [`StoreError::Json`] if serialization fails.
#[instrument(skip(records), fields(count = records.len(), path = %path.display()))]
pub async fn save_records(records: &[PersistedRecord], path: &Path) -> Result<(), StoreError> {
    let data = serde_json::to_vec_pretty(records).map_err(|source| StoreError::json(path, source))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| StoreError::io(parent, source))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp, &data)
        .await
        .map_err(|source| StoreError::io(&tmp, source))?;
    if let Err(source) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::io(path, source));
    }

    debug!(bytes = data.len(), "records saved");
    Ok(())
}

/// Loads records from a JSON array file. A missing file is an empty list.
///
/// # Errors
///
/// Returns [`StoreError::Io`] on file system failures and
/// [`StoreError::Json`] when the contents do not parse.
#[instrument(fields(path = %path.display()))]
pub async fn load_records(path: &Path) -> Result<Vec<PersistedRecord>, StoreError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(StoreError::io(path, source)),
    };
    serde_json::from_slice(&raw).map_err(|source| StoreError::json(path, source))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_record() -> EnrichedRecord {
        EnrichedRecord {
            doi: "10.1234/example".to_string(),
            title: "An Example Paper".to_string(),
            authors: vec!["Jane Doe".to_string(), "John Smith".to_string()],
            year: Some(2024),
            venue: "Journal of Examples".to_string(),
            abstract_text: "We demonstrate things.".to_string(),
            asset_url: Some("https://publisher.example/a.pdf".to_string()),
            fallback_asset_url: None,
            license_open: true,
            status: RecordStatus::Enriched,
        }
    }

    #[test]
    fn test_persisted_schema_round_trip_equality() {
        let persisted = PersistedRecord::from_record(&sample_record(), None);
        let json = serde_json::to_string(&persisted).unwrap();
        let back: PersistedRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(persisted, back);
    }

    #[test]
    fn test_schema_field_names_match_contract() {
        let persisted = PersistedRecord::from_record(&sample_record(), None);
        let value = serde_json::to_value(&persisted).unwrap();
        let object = value.as_object().unwrap();
        for field in [
            "doi",
            "title",
            "authors",
            "year",
            "venue",
            "abstract",
            "asset_path",
            "license_open",
            "status",
        ] {
            assert!(object.contains_key(field), "missing field {field}");
        }
        assert_eq!(object["abstract"], "We demonstrate things.");
        assert_eq!(object["status"], "enriched");
    }

    #[test]
    fn test_record_round_trip_preserves_schema_fields() {
        let record = sample_record();
        let back = PersistedRecord::from_record(&record, None).into_record();
        assert_eq!(back.doi, record.doi);
        assert_eq!(back.title, record.title);
        assert_eq!(back.authors, record.authors);
        assert_eq!(back.year, record.year);
        assert_eq!(back.venue, record.venue);
        assert_eq!(back.abstract_text, record.abstract_text);
        assert_eq!(back.license_open, record.license_open);
        assert_eq!(back.status, record.status);
    }

    #[test]
    fn test_from_record_takes_path_only_from_downloaded_outcome() {
        let downloaded = AssetOutcome {
            doi: "10.1234/example".to_string(),
            destination: Some(PathBuf::from("downloads/10.1234_example.pdf")),
            bytes_written: 42,
            status: AssetStatus::Downloaded,
        };
        let skipped = AssetOutcome {
            doi: "10.1234/example".to_string(),
            destination: None,
            bytes_written: 0,
            status: AssetStatus::Skipped {
                reason: "not open access".to_string(),
            },
        };

        let with_asset = PersistedRecord::from_record(&sample_record(), Some(&downloaded));
        assert_eq!(
            with_asset.asset_path.as_deref(),
            Some("downloads/10.1234_example.pdf")
        );

        let without_asset = PersistedRecord::from_record(&sample_record(), Some(&skipped));
        assert_eq!(without_asset.asset_path, None);
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("records.json");
        let records = vec![PersistedRecord::from_record(&sample_record(), None)];

        save_records(&records, &path).await.unwrap();
        let loaded = load_records(&path).await.unwrap();
        assert_eq!(loaded, records);

        // No temporary file left behind
        assert!(!temp_dir.path().join("records.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = load_records(&temp_dir.path().join("absent.json")).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_json_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("records.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            load_records(&path).await,
            Err(StoreError::Json { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/records.json");
        save_records(&[], &path).await.unwrap();
        assert!(path.exists());
    }
}

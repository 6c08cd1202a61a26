//! DOI normalization, validation, and extraction.
//!
//! Every resolution strategy funnels its candidate through the same
//! `normalize` → `validate` pair, so an identifier either comes out in
//! canonical form or is rejected outright - never a partial DOI.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::trace;

/// Regex pattern for bare DOIs in free text: `10.XXXX/suffix`.
#[allow(clippy::expect_used)]
static DOI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"10\.\d{4,9}/[^\s<>"'\]]+"#).expect("DOI regex is valid") // Static pattern, safe to panic
});

/// Canonical form check: `10.` + 4-9 digit registrant + `/` + non-whitespace suffix.
#[allow(clippy::expect_used)]
static DOI_CANONICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^10\.\d{4,9}/\S+$").expect("canonical DOI regex is valid") // Static pattern, safe to panic
});

/// Citation-style meta tags carrying a DOI in their `content` attribute.
#[allow(clippy::expect_used)]
static META_DOI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<meta[^>]*name\s*=\s*["'](?:citation_doi|dc\.identifier|doi)["'][^>]*content\s*=\s*["']([^"']+)["']"#,
    )
    .expect("meta DOI regex is valid") // Static pattern, safe to panic
});

/// Punctuation commonly wrapped around DOIs in running text.
const SURROUNDING_PUNCTUATION: &[char] = &[
    '(', ')', '[', ']', '{', '}', '<', '>', '.', ',', ';', ':', '"', '\'',
];

/// A candidate identifier failed the canonical pattern.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("'{candidate}' does not match the canonical DOI pattern 10.NNNN/suffix")]
pub struct ValidationError {
    /// The rejected candidate, post-normalization.
    pub candidate: String,
}

/// Normalizes a raw DOI candidate into canonical lowercase form.
///
/// Strips `doi.org` URL prefixes and `doi:` labels, trims surrounding
/// whitespace and punctuation, and lowercases. Idempotent:
/// `normalize(normalize(x)) == normalize(x)` for any input.
///
/// URL-decoding is deliberately not performed here - decoding is not
/// idempotent for double-encoded input, so encoded candidates are left to
/// fail validation instead.
#[must_use]
pub fn normalize(raw: &str) -> String {
    let mut doi = raw.to_lowercase();

    // Iterate to a fixpoint: stripping a prefix can expose wrapping
    // punctuation and vice versa (e.g. "(doi:10.1234/x)").
    loop {
        let before = doi.clone();

        doi = doi
            .trim_matches(|c: char| c.is_whitespace() || SURROUNDING_PUNCTUATION.contains(&c))
            .to_string();

        for prefix in [
            "https://doi.org/",
            "http://doi.org/",
            "https://dx.doi.org/",
            "http://dx.doi.org/",
        ] {
            if let Some(stripped) = doi.strip_prefix(prefix) {
                doi = stripped.to_string();
                break;
            }
        }

        if let Some(stripped) = doi.strip_prefix("doi:") {
            doi = stripped.to_string();
        }

        if doi == before {
            return doi;
        }
    }
}

/// Validates a normalized candidate against the canonical DOI pattern.
///
/// # Errors
///
/// Returns [`ValidationError`] when the candidate does not match
/// `10.<4-9 digits>/<non-whitespace suffix>`.
pub fn validate(candidate: &str) -> Result<String, ValidationError> {
    if DOI_CANONICAL.is_match(candidate) {
        Ok(candidate.to_string())
    } else {
        Err(ValidationError {
            candidate: candidate.to_string(),
        })
    }
}

/// Extracts the first valid DOI from free text, canonicalized.
///
/// Candidates that fail validation after normalization are skipped, so the
/// first *valid* occurrence wins.
#[must_use]
pub fn extract(text: &str) -> Option<String> {
    for found in DOI_PATTERN.find_iter(text) {
        let candidate = normalize(found.as_str());
        if let Ok(doi) = validate(&candidate) {
            trace!(doi = %doi, "extracted DOI from text");
            return Some(doi);
        }
    }
    None
}

/// Extracts a valid DOI from citation-style meta tags in markup.
///
/// Looks at `citation_doi`, `dc.identifier`, and `doi` meta names, in
/// document order, returning the first content value that survives
/// normalization and validation.
#[must_use]
pub fn extract_from_meta(markup: &str) -> Option<String> {
    for caps in META_DOI_PATTERN.captures_iter(markup) {
        if let Some(content) = caps.get(1) {
            let candidate = normalize(content.as_str());
            if let Ok(doi) = validate(&candidate) {
                trace!(doi = %doi, "extracted DOI from meta tag");
                return Some(doi);
            }
        }
    }
    None
}

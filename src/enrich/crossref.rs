//! Crossref works API response types and extraction helpers.
//!
//! The API serves textual fields inconsistently: sometimes a scalar,
//! sometimes a one-or-more-element array. [`TextOrList`] absorbs both
//! shapes so the rest of the enricher only ever sees one string.

use serde::Deserialize;

/// Top-level works response.
#[derive(Debug, Deserialize)]
pub(crate) struct WorksResponse {
    pub status: String,
    pub message: WorksMessage,
}

/// The `message` object of a works response.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct WorksMessage {
    pub title: Option<TextOrList>,
    pub container_title: Option<TextOrList>,
    pub author: Option<Vec<WorkAuthor>>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub link: Option<Vec<WorkLink>>,
    pub license: Option<Vec<WorkLicense>>,
    pub published: Option<WorkDate>,
    pub published_print: Option<WorkDate>,
    pub published_online: Option<WorkDate>,
}

/// A textual field that may arrive as a scalar or an ordered list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum TextOrList {
    Text(String),
    List(Vec<String>),
}

impl TextOrList {
    /// First element if a list, the scalar otherwise, empty when the list
    /// is empty.
    pub(crate) fn first(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::List(items) => items.first().map(String::as_str).unwrap_or(""),
        }
    }
}

/// Normalizes an optional text field to a single owned string.
pub(crate) fn first_text(field: Option<&TextOrList>) -> String {
    field.map(TextOrList::first).unwrap_or("").to_string()
}

/// An author entry.
#[derive(Debug, Deserialize)]
pub(crate) struct WorkAuthor {
    pub given: Option<String>,
    pub family: Option<String>,
}

/// A resource link entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct WorkLink {
    /// The URL field is uppercase in the Crossref response.
    #[serde(rename = "URL")]
    pub url: String,
    pub content_type: Option<String>,
    pub intended_application: Option<String>,
}

/// A license entry.
#[derive(Debug, Deserialize)]
pub(crate) struct WorkLicense {
    #[serde(rename = "URL")]
    pub url: String,
}

/// A date entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct WorkDate {
    pub date_parts: Option<Vec<Vec<Option<i32>>>>,
}

/// Formats authors as `"Given Family"`, keeping whichever half is present.
pub(crate) fn format_authors(authors: &[WorkAuthor]) -> Vec<String> {
    authors
        .iter()
        .map(|author| match (&author.given, &author.family) {
            (Some(given), Some(family)) => format!("{given} {family}"),
            (Some(given), None) => given.clone(),
            (None, Some(family)) => family.clone(),
            (None, None) => String::new(),
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// Year from the first date-parts entry.
pub(crate) fn extract_year(date: Option<&WorkDate>) -> Option<i32> {
    date.and_then(|d| d.date_parts.as_ref())
        .and_then(|parts| parts.first())
        .and_then(|inner| inner.first())
        .copied()
        .flatten()
}

/// Best asset URL from link entries.
///
/// Priority:
/// 1. Links with `content-type: application/pdf`
/// 2. Links with `intended-application: text-mining` or `similarity-checking`
pub(crate) fn primary_asset_url(links: &[WorkLink]) -> Option<String> {
    for link in links {
        if let Some(content_type) = &link.content_type {
            if is_pdf_content_type(content_type) {
                return Some(link.url.clone());
            }
        }
    }
    for link in links {
        if let Some(application) = &link.intended_application {
            if is_fallback_application(application) {
                return Some(link.url.clone());
            }
        }
    }
    None
}

fn is_pdf_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|mime| mime.eq_ignore_ascii_case("application/pdf"))
}

fn is_fallback_application(intended_application: &str) -> bool {
    intended_application.eq_ignore_ascii_case("text-mining")
        || intended_application.eq_ignore_ascii_case("similarity-checking")
}

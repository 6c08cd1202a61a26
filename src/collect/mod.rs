//! Reference skeleton extraction from a rendered document page.
//!
//! The [`SkeletonCollector`] drives the rendering capability to locate the
//! references container, then walks its entries producing one immutable
//! [`ReferenceSkeleton`] per reference: a raw title, the leftover author
//! text, and whatever candidate links the entry carried.

mod error;

pub use error::CollectError;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::PipelineConfig;
use crate::fetch::filename::sanitize_component;
use crate::render::{ElementId, PageId, Renderer, SelectorIntent};

/// Quoted title inside an entry's text, straight or curly quotes.
#[allow(clippy::expect_used)]
static QUOTED_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"]{2,})"|“([^”]{2,})”"#).expect("quoted title regex is valid") // Static pattern, safe to panic
});

/// Link labels that mark a Crossref landing page.
const CROSSREF_LABELS: [&str; 2] = ["crossref", "cross ref"];

/// Link labels that mark a publisher view-article page.
const VIEW_ARTICLE_LABELS: [&str; 3] = ["view article", "view at publisher", "full text"];

/// Link labels that mark a scholar profile/citation page.
const SCHOLAR_LABELS: [&str; 2] = ["google scholar", "scholar"];

/// Category of an outbound link on a reference entry.
///
/// Classification is a pure function of the link's visible label against a
/// fixed case-insensitive label set. Unmatched links are [`Other`] and play
/// no part in resolution.
///
/// [`Other`]: LinkCategory::Other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkCategory {
    /// Link to a Crossref landing page for the reference.
    CrossrefLanding,
    /// Link to the publisher's article page.
    ViewArticle,
    /// Link to a scholar profile or citation listing.
    ScholarProfile,
    /// Anything else; discarded for resolution purposes.
    Other,
}

impl LinkCategory {
    /// Classifies a link's visible label. First matching category wins.
    #[must_use]
    pub fn classify(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if label.is_empty() {
            return Self::Other;
        }
        if CROSSREF_LABELS.iter().any(|known| label.contains(known)) {
            Self::CrossrefLanding
        } else if VIEW_ARTICLE_LABELS.iter().any(|known| label.contains(known)) {
            Self::ViewArticle
        } else if SCHOLAR_LABELS.iter().any(|known| label.contains(known)) {
            Self::ScholarProfile
        } else {
            Self::Other
        }
    }
}

/// A raw, unresolved reference entry extracted from a rendered document.
///
/// Created once by the collector and immutable thereafter. `index` is the
/// join key across every later phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSkeleton {
    /// Stable, sequential, zero-based position within the run.
    pub index: usize,
    /// Best-effort title; `Untitled #<n>` when nothing usable was found.
    pub raw_title: String,
    /// Entry text with the title occurrence removed.
    pub raw_authors_text: String,
    /// Candidate links by category; at most one URL per category.
    pub candidate_links: HashMap<LinkCategory, String>,
}

impl ReferenceSkeleton {
    /// Returns the candidate link for a category, if present.
    #[must_use]
    pub fn link(&self, category: LinkCategory) -> Option<&str> {
        self.candidate_links.get(&category).map(String::as_str)
    }

    /// The skeleton's own captured text, used by the raw-text fallback.
    #[must_use]
    pub fn resolution_text(&self) -> String {
        format!("{} {}", self.raw_title, self.raw_authors_text)
    }
}

/// Extracts reference skeletons from one document via the rendering
/// capability. One page session is acquired and released per document.
#[derive(Debug)]
pub struct SkeletonCollector {
    container_wait: Duration,
    poll_interval: Duration,
    capture_dir: Option<PathBuf>,
}

impl SkeletonCollector {
    /// Creates a collector from the pipeline configuration.
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            container_wait: config.container_wait,
            poll_interval: config.container_poll_interval,
            capture_dir: config.capture_dir.clone(),
        }
    }

    /// Collects the ordered reference skeletons for one document.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::ContainerNotFound`] when the references
    /// container never appears within the bounded wait, and
    /// [`CollectError::Render`] when the capability itself fails.
    #[instrument(skip(self, renderer))]
    pub async fn collect(
        &self,
        renderer: &dyn Renderer,
        document_url: &str,
    ) -> Result<Vec<ReferenceSkeleton>, CollectError> {
        let page = renderer.navigate(document_url).await?;
        let result = self.collect_on_page(renderer, page, document_url).await;
        if let Err(error) = renderer.close(page).await {
            debug!(error = %error, "failed to release page session");
        }
        result
    }

    async fn collect_on_page(
        &self,
        renderer: &dyn Renderer,
        page: PageId,
        document_url: &str,
    ) -> Result<Vec<ReferenceSkeleton>, CollectError> {
        if self.capture_dir.is_some() {
            self.capture_markup(renderer, page, document_url).await;
        }

        let container = self.wait_for_container(renderer, page, document_url).await?;
        let entries = renderer
            .query_within(container, SelectorIntent::ReferenceEntries)
            .await?;

        let mut skeletons = Vec::with_capacity(entries.len());
        for (index, &entry) in entries.iter().enumerate() {
            skeletons.push(build_skeleton(renderer, entry, index).await?);
        }

        info!(
            document_url,
            found = skeletons.len(),
            "reference extraction complete"
        );
        Ok(skeletons)
    }

    /// Polls for the references container until found or the wait expires.
    async fn wait_for_container(
        &self,
        renderer: &dyn Renderer,
        page: PageId,
        document_url: &str,
    ) -> Result<ElementId, CollectError> {
        let started = Instant::now();
        loop {
            let containers = renderer
                .query(page, SelectorIntent::ReferencesContainer)
                .await?;
            if let Some(&container) = containers.first() {
                return Ok(container);
            }
            if started.elapsed() >= self.container_wait {
                return Err(CollectError::container_not_found(
                    document_url,
                    started.elapsed().as_millis(),
                ));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Persists the rendered markup for diagnosis. Best-effort only.
    async fn capture_markup(&self, renderer: &dyn Renderer, page: PageId, document_url: &str) {
        let Some(dir) = &self.capture_dir else {
            return;
        };
        let markup = match renderer.content(page).await {
            Ok(markup) => markup,
            Err(error) => {
                warn!(error = %error, "could not read rendered markup for capture");
                return;
            }
        };
        let path = dir.join(capture_key(document_url));
        if let Err(error) = tokio::fs::create_dir_all(dir).await {
            warn!(error = %error, dir = %dir.display(), "could not create capture directory");
            return;
        }
        match tokio::fs::write(&path, markup).await {
            Ok(()) => debug!(path = %path.display(), "captured rendered markup"),
            Err(error) => warn!(error = %error, path = %path.display(), "markup capture failed"),
        }
    }
}

/// Builds the capture filename from a sanitized document key plus timestamp.
fn capture_key(document_url: &str) -> String {
    let doc_key = Url::parse(document_url)
        .ok()
        .and_then(|url| {
            url.host_str()
                .map(|host| format!("{host}{}", url.path()))
        })
        .unwrap_or_else(|| "document".to_string());
    let doc_key = sanitize_component(&doc_key);
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{doc_key}_{timestamp}.html")
}

async fn build_skeleton(
    renderer: &dyn Renderer,
    entry: ElementId,
    index: usize,
) -> Result<ReferenceSkeleton, CollectError> {
    let entry_text = renderer.text(entry).await?;

    let heading = match renderer
        .query_within(entry, SelectorIntent::Heading)
        .await?
        .first()
    {
        Some(&heading_el) => {
            let text = renderer.text(heading_el).await?;
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        None => None,
    };

    let mut anchors = Vec::new();
    for link_el in renderer.query_within(entry, SelectorIntent::Links).await? {
        let label = renderer.text(link_el).await?;
        let href = renderer.attribute(link_el, "href").await?;
        anchors.push((label, href));
    }
    let first_anchor_text = anchors
        .iter()
        .map(|(label, _)| label.trim())
        .find(|label| !label.is_empty())
        .map(str::to_string);

    let (raw_title, removable) = extract_title(&entry_text, heading, first_anchor_text, index);
    let raw_authors_text = author_text(&entry_text, removable.as_deref());

    let mut candidate_links = HashMap::new();
    for (label, href) in anchors {
        let category = LinkCategory::classify(&label);
        if category == LinkCategory::Other {
            continue;
        }
        let Some(href) = href else { continue };
        candidate_links.entry(category).or_insert(href);
    }

    Ok(ReferenceSkeleton {
        index,
        raw_title,
        raw_authors_text,
        candidate_links,
    })
}

/// Picks the entry's title and the exact substring to remove from its text.
///
/// Priority: quoted substring, heading child, first anchor text, then an
/// `Untitled #<n>` placeholder so the title is never empty.
fn extract_title(
    entry_text: &str,
    heading: Option<String>,
    first_anchor: Option<String>,
    index: usize,
) -> (String, Option<String>) {
    if let Some(caps) = QUOTED_TITLE.captures(entry_text) {
        let inner = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().trim().to_string());
        if let (Some(title), Some(full)) = (inner.filter(|t| !t.is_empty()), caps.get(0)) {
            return (title, Some(full.as_str().to_string()));
        }
    }
    if let Some(heading) = heading {
        let removable = heading.clone();
        return (heading, Some(removable));
    }
    if let Some(anchor) = first_anchor {
        let removable = anchor.clone();
        return (anchor, Some(removable));
    }
    (format!("Untitled #{}", index + 1), None)
}

/// Entry text with the title occurrence removed and whitespace collapsed.
fn author_text(entry_text: &str, removable: Option<&str>) -> String {
    let remainder = match removable {
        Some(sub) => entry_text.replacen(sub, "", 1),
        None => entry_text.to_string(),
    };
    remainder.split_whitespace().collect::<Vec<_>>().join(" ")
}

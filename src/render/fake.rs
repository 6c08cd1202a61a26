//! Scripted in-memory renderer.
//!
//! Serves pre-built pages so collector and pipeline behavior can be tested
//! without a browser engine. Pages are registered up front; handles are
//! validated the same way a real capability would reject stale ones.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ElementId, PageId, RenderError, Renderer, SelectorIntent};

/// One scripted reference entry.
#[derive(Debug, Clone, Default)]
pub struct FakeEntry {
    /// Full visible text of the entry.
    pub text: String,
    /// Optional heading/title-styled child text.
    pub heading: Option<String>,
    /// Anchors as `(visible label, href)` pairs.
    pub links: Vec<(String, String)>,
}

impl FakeEntry {
    /// Creates an entry with the given visible text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Adds a heading child.
    #[must_use]
    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    /// Adds an anchor.
    #[must_use]
    pub fn with_link(mut self, label: impl Into<String>, href: impl Into<String>) -> Self {
        self.links.push((label.into(), href.into()));
        self
    }
}

/// One scripted page.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    /// Whether the references container exists on this page.
    pub references_present: bool,
    /// Reference entries inside the container.
    pub entries: Vec<FakeEntry>,
    /// Raw markup returned by `content()`.
    pub markup: String,
}

impl FakePage {
    /// A page whose references container holds the given entries.
    #[must_use]
    pub fn with_entries(entries: Vec<FakeEntry>) -> Self {
        Self {
            references_present: true,
            entries,
            markup: String::new(),
        }
    }

    /// A page with no references container at all.
    #[must_use]
    pub fn without_references() -> Self {
        Self::default()
    }

    /// Sets the markup returned by `content()`.
    #[must_use]
    pub fn with_markup(mut self, markup: impl Into<String>) -> Self {
        self.markup = markup.into();
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum FakeElement {
    Container { page: u64 },
    Entry { page: u64, entry: usize },
    Link { page: u64, entry: usize, link: usize },
    Heading { page: u64, entry: usize },
}

#[derive(Debug, Default)]
struct Inner {
    pages: HashMap<String, FakePage>,
    open: HashMap<u64, String>,
    elements: HashMap<u64, FakeElement>,
    next_id: u64,
}

impl Inner {
    fn allocate(&mut self, element: FakeElement) -> ElementId {
        self.next_id += 1;
        self.elements.insert(self.next_id, element);
        ElementId(self.next_id)
    }

    fn page_for(&self, id: u64) -> Result<&FakePage, RenderError> {
        let url = self.open.get(&id).ok_or(RenderError::StaleHandle)?;
        self.pages.get(url).ok_or(RenderError::StaleHandle)
    }

    fn entry_for(&self, page: u64, entry: usize) -> Result<&FakeEntry, RenderError> {
        self.page_for(page)?
            .entries
            .get(entry)
            .ok_or(RenderError::StaleHandle)
    }
}

/// Scripted [`Renderer`] backed by registered [`FakePage`] values.
#[derive(Debug, Default)]
pub struct FakeRenderer {
    inner: Mutex<Inner>,
}

impl FakeRenderer {
    /// Creates a renderer with no pages registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a page under a URL.
    pub fn add_page(&self, url: impl Into<String>, page: FakePage) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.pages.insert(url.into(), page);
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, RenderError> {
        self.inner
            .lock()
            .map_err(|_| RenderError::Session("fake renderer lock poisoned".to_string()))
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn navigate(&self, url: &str) -> Result<PageId, RenderError> {
        let mut inner = self.lock()?;
        if !inner.pages.contains_key(url) {
            return Err(RenderError::navigation(url, "no such page registered"));
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.open.insert(id, url.to_string());
        Ok(PageId(id))
    }

    async fn query(
        &self,
        page: PageId,
        intent: SelectorIntent,
    ) -> Result<Vec<ElementId>, RenderError> {
        let mut inner = self.lock()?;
        let present = inner.page_for(page.0)?.references_present;
        match intent {
            SelectorIntent::ReferencesContainer if present => {
                Ok(vec![inner.allocate(FakeElement::Container { page: page.0 })])
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn query_within(
        &self,
        element: ElementId,
        intent: SelectorIntent,
    ) -> Result<Vec<ElementId>, RenderError> {
        let mut inner = self.lock()?;
        let kind = *inner
            .elements
            .get(&element.0)
            .ok_or(RenderError::StaleHandle)?;
        match (kind, intent) {
            (FakeElement::Container { page }, SelectorIntent::ReferenceEntries) => {
                let count = inner.page_for(page)?.entries.len();
                Ok((0..count)
                    .map(|entry| inner.allocate(FakeElement::Entry { page, entry }))
                    .collect())
            }
            (FakeElement::Entry { page, entry }, SelectorIntent::Links) => {
                let count = inner.entry_for(page, entry)?.links.len();
                Ok((0..count)
                    .map(|link| inner.allocate(FakeElement::Link { page, entry, link }))
                    .collect())
            }
            (FakeElement::Entry { page, entry }, SelectorIntent::Heading) => {
                if inner.entry_for(page, entry)?.heading.is_some() {
                    Ok(vec![inner.allocate(FakeElement::Heading { page, entry })])
                } else {
                    Ok(Vec::new())
                }
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn text(&self, element: ElementId) -> Result<String, RenderError> {
        let inner = self.lock()?;
        let kind = *inner
            .elements
            .get(&element.0)
            .ok_or(RenderError::StaleHandle)?;
        match kind {
            FakeElement::Container { page } => {
                let entries = &inner.page_for(page)?.entries;
                Ok(entries
                    .iter()
                    .map(|e| e.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            FakeElement::Entry { page, entry } => Ok(inner.entry_for(page, entry)?.text.clone()),
            FakeElement::Link { page, entry, link } => Ok(inner
                .entry_for(page, entry)?
                .links
                .get(link)
                .map(|(label, _)| label.clone())
                .unwrap_or_default()),
            FakeElement::Heading { page, entry } => Ok(inner
                .entry_for(page, entry)?
                .heading
                .clone()
                .unwrap_or_default()),
        }
    }

    async fn attribute(
        &self,
        element: ElementId,
        name: &str,
    ) -> Result<Option<String>, RenderError> {
        let inner = self.lock()?;
        let kind = *inner
            .elements
            .get(&element.0)
            .ok_or(RenderError::StaleHandle)?;
        if name != "href" {
            return Ok(None);
        }
        match kind {
            FakeElement::Link { page, entry, link } => Ok(inner
                .entry_for(page, entry)?
                .links
                .get(link)
                .map(|(_, href)| href.clone())),
            _ => Ok(None),
        }
    }

    async fn content(&self, page: PageId) -> Result<String, RenderError> {
        let inner = self.lock()?;
        Ok(inner.page_for(page.0)?.markup.clone())
    }

    async fn close(&self, page: PageId) -> Result<(), RenderError> {
        let mut inner = self.lock()?;
        inner.open.remove(&page.0);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_navigate_unknown_url_fails() {
        let renderer = FakeRenderer::new();
        let result = renderer.navigate("https://example.com/doc/1").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_scripted_page_round_trip() {
        let renderer = FakeRenderer::new();
        renderer.add_page(
            "https://example.com/doc/1",
            FakePage::with_entries(vec![
                FakeEntry::new("\"A Paper\" J. Smith")
                    .with_link("CrossRef", "https://example.com/xref/1"),
            ]),
        );

        let page = renderer.navigate("https://example.com/doc/1").await.unwrap();
        let containers = renderer
            .query(page, SelectorIntent::ReferencesContainer)
            .await
            .unwrap();
        assert_eq!(containers.len(), 1);

        let entries = renderer
            .query_within(containers[0], SelectorIntent::ReferenceEntries)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            renderer.text(entries[0]).await.unwrap(),
            "\"A Paper\" J. Smith"
        );

        let links = renderer
            .query_within(entries[0], SelectorIntent::Links)
            .await
            .unwrap();
        assert_eq!(renderer.text(links[0]).await.unwrap(), "CrossRef");
        assert_eq!(
            renderer.attribute(links[0], "href").await.unwrap().as_deref(),
            Some("https://example.com/xref/1")
        );
    }

    #[tokio::test]
    async fn test_closed_page_handle_goes_stale() {
        let renderer = FakeRenderer::new();
        renderer.add_page("https://example.com/doc/1", FakePage::with_entries(vec![]));
        let page = renderer.navigate("https://example.com/doc/1").await.unwrap();
        renderer.close(page).await.unwrap();
        let result = renderer.query(page, SelectorIntent::ReferencesContainer).await;
        assert!(matches!(result, Err(RenderError::StaleHandle)));
    }
}

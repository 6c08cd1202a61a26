//! Rendering capability boundary.
//!
//! The pipeline consumes page rendering as a capability: navigate to a URL,
//! query elements by intent, read element text and attributes. It never
//! manages the engine behind the capability beyond acquiring and releasing
//! one page session per document.
//!
//! # Object Safety
//!
//! [`Renderer`] uses `async_trait` to support dynamic dispatch via
//! `Arc<dyn Renderer>`. Rust 2024 native async traits are not object-safe,
//! so `async_trait` is required for the capability boundary.

pub mod fake;

use async_trait::async_trait;
use thiserror::Error;

pub use fake::{FakeEntry, FakePage, FakeRenderer};

/// Opaque handle to an open page session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId(pub u64);

/// Opaque handle to an element within a page session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub u64);

/// What the pipeline wants located, leaving selector strings to the
/// capability implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorIntent {
    /// The container holding the document's reference list.
    ReferencesContainer,
    /// The individual reference entries inside the container.
    ReferenceEntries,
    /// Outbound anchors within an element.
    Links,
    /// A heading or title-styled child within an element.
    Heading,
}

/// Errors surfaced by a rendering capability.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// Navigation to the document URL failed.
    #[error("navigation to {url} failed: {reason}")]
    Navigation {
        /// The URL that could not be opened.
        url: String,
        /// Engine-provided failure description.
        reason: String,
    },

    /// A page or element handle no longer refers to live content.
    #[error("stale or unknown render handle")]
    StaleHandle,

    /// Any other failure inside the rendering session.
    #[error("render session error: {0}")]
    Session(String),
}

impl RenderError {
    /// Creates a navigation error.
    #[must_use]
    pub fn navigation(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// The rendering capability consumed by the skeleton collector.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Opens the document and returns a page session handle.
    async fn navigate(&self, url: &str) -> Result<PageId, RenderError>;

    /// Locates elements matching an intent anywhere on the page.
    async fn query(&self, page: PageId, intent: SelectorIntent)
    -> Result<Vec<ElementId>, RenderError>;

    /// Locates elements matching an intent within a specific element.
    async fn query_within(
        &self,
        element: ElementId,
        intent: SelectorIntent,
    ) -> Result<Vec<ElementId>, RenderError>;

    /// Returns the visible text of an element.
    async fn text(&self, element: ElementId) -> Result<String, RenderError>;

    /// Returns an attribute value of an element, if present.
    async fn attribute(&self, element: ElementId, name: &str)
    -> Result<Option<String>, RenderError>;

    /// Returns the full rendered markup of the page.
    async fn content(&self, page: PageId) -> Result<String, RenderError>;

    /// Releases the page session.
    async fn close(&self, page: PageId) -> Result<(), RenderError>;
}

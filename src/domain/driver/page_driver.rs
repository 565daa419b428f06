use async_trait::async_trait;
use std::path::Path;
use tokio::sync::broadcast;

use crate::error::Result;

/// Opaque handle to a located page element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

/// Click and fill accept either a previously located handle or a selector.
#[derive(Debug, Clone)]
pub enum ElementRef {
    Handle(ElementHandle),
    Selector(String),
}

impl From<ElementHandle> for ElementRef {
    fn from(handle: ElementHandle) -> Self {
        ElementRef::Handle(handle)
    }
}

impl From<&str> for ElementRef {
    fn from(selector: &str) -> Self {
        ElementRef::Selector(selector.to_string())
    }
}

impl From<String> for ElementRef {
    fn from(selector: String) -> Self {
        ElementRef::Selector(selector)
    }
}

/// A network response observed by the page, delivered to armed listeners.
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub url: String,
    pub status: u16,
    pub body: Option<serde_json::Value>,
}

/// Capability set of the headless-browser page this engine drives.
///
/// Selectors are plain strings; an `xpath=` prefix marks an XPath
/// expression, everything else is CSS. The concrete browser binding lives
/// outside this crate; tests run against the scripted mock.
#[async_trait]
pub trait PageDriver: std::fmt::Debug + Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn locate_all(&self, selector: &str) -> Result<Vec<ElementHandle>>;

    async fn wait_for_visible(&self, selector: &str, timeout_ms: u64) -> Result<()>;

    async fn click(&self, target: ElementRef) -> Result<()>;

    async fn fill(&self, target: ElementRef, value: &str) -> Result<()>;

    async fn input_value(&self, selector: &str) -> Result<String>;

    async fn get_attribute(&self, handle: ElementHandle, name: &str) -> Result<Option<String>>;

    async fn text_content(&self, selector: &str) -> Result<Option<String>>;

    async fn page_url(&self) -> Result<String>;

    /// Arms a response listener. The returned receiver only observes
    /// responses emitted after subscription, so callers arm it before the
    /// action whose responses they want to see and drop it afterwards.
    fn subscribe_responses(&self) -> broadcast::Receiver<PageResponse>;

    async fn wait_for_timeout(&self, ms: u64);

    async fn press_key(&self, name: &str) -> Result<()>;

    async fn screenshot(&self, path: &Path) -> Result<()>;
}

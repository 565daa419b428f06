use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

use crate::domain::driver::page_driver::{ElementHandle, ElementRef, PageDriver, PageResponse};
use crate::error::{Error, Result};

/// Scripted page driver used by unit and integration tests.
///
/// Elements are registered with a tag and attribute map; `locate_all`
/// evaluates the subset of CSS this crate's selector tiers actually use
/// (tag, `#id`, `.class`, `[attr]`, `[attr='value']`). XPath selectors and
/// anything the matcher cannot parse only resolve through explicit
/// overrides set with [`MockPageDriver::set_selector_result`].
#[derive(Debug, Clone)]
pub struct MockPageDriver {
    inner: Arc<MockState>,
}

#[derive(Debug)]
struct MockState {
    elements: RwLock<Vec<MockElement>>,
    overrides: RwLock<HashMap<String, Vec<ElementHandle>>>,
    texts: RwLock<HashMap<String, String>>,
    input_values: RwLock<HashMap<String, String>>,
    url: RwLock<String>,
    next_handle: RwLock<u64>,
    error_queues: RwLock<HashMap<String, VecDeque<Error>>>,
    navigations: RwLock<Vec<String>>,
    clicks: RwLock<Vec<String>>,
    fills: RwLock<Vec<(String, String)>>,
    key_presses: RwLock<Vec<String>>,
    screenshots: RwLock<Vec<String>>,
    responses: broadcast::Sender<PageResponse>,
    click_responses: RwLock<Vec<(String, PageResponse)>>,
}

#[derive(Debug, Clone)]
struct MockElement {
    handle: ElementHandle,
    tag: String,
    attrs: HashMap<String, String>,
}

#[derive(Debug)]
struct CssRequirements {
    tag: Option<String>,
    conds: Vec<CssCond>,
}

#[derive(Debug)]
enum CssCond {
    HasAttr(String),
    AttrEquals(String, String),
    HasClass(String),
}

impl MockPageDriver {
    pub fn new() -> MockPageDriver {
        let (responses, _) = broadcast::channel(64);
        MockPageDriver {
            inner: Arc::new(MockState {
                elements: RwLock::new(Vec::new()),
                overrides: RwLock::new(HashMap::new()),
                texts: RwLock::new(HashMap::new()),
                input_values: RwLock::new(HashMap::new()),
                url: RwLock::new("about:blank".to_string()),
                next_handle: RwLock::new(1),
                error_queues: RwLock::new(HashMap::new()),
                navigations: RwLock::new(Vec::new()),
                clicks: RwLock::new(Vec::new()),
                fills: RwLock::new(Vec::new()),
                key_presses: RwLock::new(Vec::new()),
                screenshots: RwLock::new(Vec::new()),
                responses,
                click_responses: RwLock::new(Vec::new()),
            }),
        }
    }

    // --- Test scripting ---

    pub fn register_element(&self, tag: &str, attrs: &[(&str, &str)]) -> ElementHandle {
        let mut next = self.inner.next_handle.write().unwrap();
        let handle = ElementHandle(*next);
        *next += 1;

        let attrs = attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        self.inner.elements.write().unwrap().push(MockElement { handle, tag: tag.to_string(), attrs });
        handle
    }

    /// Registers one calendar cell with the attribute quadruple the
    /// extractor reads.
    pub fn register_calendar_cell(&self, date: &str, start_compact: &str, court: &str, state: &str) -> ElementHandle {
        self.register_element("td", &[("data-date", date), ("data-start", start_compact), ("data-court", court), ("data-state", state)])
    }

    pub fn remove_elements_matching(&self, attr: &str, value: &str) {
        self.inner.elements.write().unwrap().retain(|e| e.attrs.get(attr).map(|v| v.as_str()) != Some(value));
    }

    /// Forces an exact selector string to resolve to the given handles,
    /// bypassing the CSS matcher.
    pub fn set_selector_result(&self, selector: &str, handles: Vec<ElementHandle>) {
        self.inner.overrides.write().unwrap().insert(selector.to_string(), handles);
    }

    pub fn set_text(&self, selector: &str, text: &str) {
        self.inner.texts.write().unwrap().insert(selector.to_string(), text.to_string());
    }

    pub fn set_input_value(&self, selector: &str, value: &str) {
        self.inner.input_values.write().unwrap().insert(selector.to_string(), value.to_string());
    }

    pub fn set_url(&self, url: &str) {
        *self.inner.url.write().unwrap() = url.to_string();
    }

    /// Queues an error for the next call of the named operation
    /// (`navigate`, `locate_all`, `click`, ...).
    pub fn push_error(&self, operation: &str, error: Error) {
        self.inner.error_queues.write().unwrap().entry(operation.to_string()).or_default().push_back(error);
    }

    pub fn emit_response(&self, url: &str, status: u16, body: Option<serde_json::Value>) {
        // Send fails when no listener is armed, which is fine for tests.
        let _ = self.inner.responses.send(PageResponse { url: url.to_string(), status, body });
    }

    /// Emits the given response whenever a click target contains `needle`,
    /// simulating the booking backend answering the commit action.
    pub fn respond_on_click(&self, needle: &str, url: &str, status: u16, body: Option<serde_json::Value>) {
        self.inner.click_responses.write().unwrap().push((needle.to_string(), PageResponse { url: url.to_string(), status, body }));
    }

    // --- Recorded interactions ---

    pub fn navigations(&self) -> Vec<String> {
        self.inner.navigations.read().unwrap().clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.inner.clicks.read().unwrap().clone()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.inner.fills.read().unwrap().clone()
    }

    pub fn screenshots(&self) -> Vec<String> {
        self.inner.screenshots.read().unwrap().clone()
    }

    fn take_error(&self, operation: &str) -> Option<Error> {
        self.inner.error_queues.write().unwrap().get_mut(operation).and_then(|queue| queue.pop_front())
    }

    fn matches(&self, selector: &str) -> Vec<ElementHandle> {
        if let Some(handles) = self.inner.overrides.read().unwrap().get(selector) {
            return handles.clone();
        }

        let Some(requirements) = parse_css(selector) else {
            return Vec::new();
        };

        self.inner
            .elements
            .read()
            .unwrap()
            .iter()
            .filter(|element| element_matches(element, &requirements))
            .map(|element| element.handle)
            .collect()
    }

    fn describe(&self, target: &ElementRef) -> String {
        match target {
            ElementRef::Handle(handle) => format!("handle:{}", handle.0),
            ElementRef::Selector(selector) => selector.clone(),
        }
    }
}

impl Default for MockPageDriver {
    fn default() -> Self {
        MockPageDriver::new()
    }
}

fn parse_css(selector: &str) -> Option<CssRequirements> {
    if selector.starts_with("xpath=") || selector.contains(' ') {
        return None;
    }

    let mut chars = selector.chars().peekable();
    let mut tag = String::new();
    while let Some(c) = chars.peek() {
        if c.is_ascii_alphanumeric() || *c == '-' {
            tag.push(*c);
            chars.next();
        } else {
            break;
        }
    }

    let mut conds = Vec::new();
    while let Some(c) = chars.next() {
        match c {
            '#' => {
                let ident: String = take_ident(&mut chars);
                conds.push(CssCond::AttrEquals("id".to_string(), ident));
            }
            '.' => {
                let ident: String = take_ident(&mut chars);
                conds.push(CssCond::HasClass(ident));
            }
            '[' => {
                let mut body = String::new();
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    body.push(inner);
                }
                match body.split_once('=') {
                    Some((name, value)) => {
                        let value = value.trim_matches(|q| q == '\'' || q == '"');
                        conds.push(CssCond::AttrEquals(name.to_string(), value.to_string()));
                    }
                    None => conds.push(CssCond::HasAttr(body)),
                }
            }
            _ => return None,
        }
    }

    Some(CssRequirements { tag: if tag.is_empty() { None } else { Some(tag) }, conds })
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut ident = String::new();
    while let Some(c) = chars.peek() {
        if c.is_ascii_alphanumeric() || *c == '-' || *c == '_' {
            ident.push(*c);
            chars.next();
        } else {
            break;
        }
    }
    ident
}

fn element_matches(element: &MockElement, requirements: &CssRequirements) -> bool {
    if let Some(tag) = &requirements.tag {
        if element.tag != *tag {
            return false;
        }
    }

    requirements.conds.iter().all(|cond| match cond {
        CssCond::HasAttr(name) => element.attrs.contains_key(name),
        CssCond::AttrEquals(name, value) => element.attrs.get(name) == Some(value),
        CssCond::HasClass(class) => element.attrs.get("class").map(|c| c.split_whitespace().any(|t| t == class)).unwrap_or(false),
    })
}

#[async_trait]
impl PageDriver for MockPageDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        if let Some(error) = self.take_error("navigate") {
            return Err(error);
        }
        self.inner.navigations.write().unwrap().push(url.to_string());
        *self.inner.url.write().unwrap() = url.to_string();
        Ok(())
    }

    async fn locate_all(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        if let Some(error) = self.take_error("locate_all") {
            return Err(error);
        }
        Ok(self.matches(selector))
    }

    async fn wait_for_visible(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        if let Some(error) = self.take_error("wait_for_visible") {
            return Err(error);
        }
        if self.matches(selector).is_empty() {
            return Err(Error::Timeout(format!("Element '{}' did not become visible within {} ms.", selector, timeout_ms)));
        }
        Ok(())
    }

    async fn click(&self, target: ElementRef) -> Result<()> {
        if let Some(error) = self.take_error("click") {
            return Err(error);
        }
        let described = self.describe(&target);
        self.inner.clicks.write().unwrap().push(described.clone());

        for (needle, response) in self.inner.click_responses.read().unwrap().iter() {
            if described.contains(needle.as_str()) {
                let _ = self.inner.responses.send(response.clone());
            }
        }
        Ok(())
    }

    async fn fill(&self, target: ElementRef, value: &str) -> Result<()> {
        if let Some(error) = self.take_error("fill") {
            return Err(error);
        }
        self.inner.fills.write().unwrap().push((self.describe(&target), value.to_string()));
        Ok(())
    }

    async fn input_value(&self, selector: &str) -> Result<String> {
        Ok(self.inner.input_values.read().unwrap().get(selector).cloned().unwrap_or_default())
    }

    async fn get_attribute(&self, handle: ElementHandle, name: &str) -> Result<Option<String>> {
        if let Some(error) = self.take_error("get_attribute") {
            return Err(error);
        }
        let elements = self.inner.elements.read().unwrap();
        Ok(elements.iter().find(|e| e.handle == handle).and_then(|e| e.attrs.get(name).cloned()))
    }

    async fn text_content(&self, selector: &str) -> Result<Option<String>> {
        Ok(self.inner.texts.read().unwrap().get(selector).cloned())
    }

    async fn page_url(&self) -> Result<String> {
        Ok(self.inner.url.read().unwrap().clone())
    }

    fn subscribe_responses(&self) -> broadcast::Receiver<PageResponse> {
        self.inner.responses.subscribe()
    }

    async fn wait_for_timeout(&self, _ms: u64) {
        // Simulated time; tests never sleep for real.
        tokio::task::yield_now().await;
    }

    async fn press_key(&self, name: &str) -> Result<()> {
        self.inner.key_presses.write().unwrap().push(name.to_string());
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.inner.screenshots.write().unwrap().push(path.display().to_string());
        Ok(())
    }
}

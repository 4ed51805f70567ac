// Common test utilities: an in-memory page host, scripted oracles and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use webpilot::annotate::MarkerLocator;
use webpilot::annotate::MarkerPlan;
use webpilot::{
    ActionRequest, CatalogBuilder, DecisionOracle, FoundElement, HostError, OracleError,
    PageHost, PageSnapshot, Point, Query, StepRecord, parse_action,
};

/// A live element on the fake page
#[derive(Debug, Clone, Default)]
pub struct FakeNode {
    pub tag: String,
    pub role: Option<String>,
    pub text: Option<String>,
    pub aria_label: Option<String>,
    pub label: Option<String>,
    pub placeholder: Option<String>,
    pub name: Option<String>,
    pub dom_id: Option<String>,
    pub structural_path: String,
    pub content_editable: bool,
    pub visible: bool,
    pub enabled: bool,
    pub marker: Option<String>,
    pub value: String,
    /// Errors returned by the next clicks, in order
    pub click_errors: VecDeque<HostError>,
    /// URL the page moves to when this node is clicked
    pub navigates_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeHandle(pub usize);

#[derive(Debug, Default)]
struct PageState {
    url: String,
    title: String,
    markup: String,
    nodes: Vec<FakeNode>,
    focused: Option<usize>,
    events: Vec<String>,
    queries: Vec<Query>,
    marker_error: Option<HostError>,
    navigate_error: Option<HostError>,
    /// Successful source reads left before `source_error` kicks in
    source_reads_left: Option<usize>,
    source_error: Option<HostError>,
    coordinate_errors: VecDeque<HostError>,
}

/// In-memory `PageHost`. The live nodes start out as the catalog of the markup and
/// can be edited to simulate drift between snapshot and page.
pub struct FakePage {
    state: Mutex<PageState>,
}

impl FakePage {
    pub fn new(url: &str, title: &str, markup: &str) -> Self {
        let catalog = CatalogBuilder::new(100, 3000).build(markup);
        let nodes = catalog
            .elements
            .iter()
            .map(|el| FakeNode {
                tag: el.tag.clone(),
                role: el.effective_role(),
                text: el.visible_text.clone(),
                aria_label: el.aria_label.clone(),
                label: el.nearby_label.clone(),
                placeholder: el.placeholder.clone(),
                name: el.name.clone(),
                dom_id: el.dom_id.clone(),
                structural_path: el.structural_path.clone(),
                content_editable: el.is_content_editable,
                visible: true,
                enabled: !el.disabled,
                ..FakeNode::default()
            })
            .collect();

        Self {
            state: Mutex::new(PageState {
                url: url.to_string(),
                title: title.to_string(),
                markup: markup.to_string(),
                nodes,
                ..PageState::default()
            }),
        }
    }

    /// Edit the live node at `index` (catalog order, 0-based)
    pub fn edit_node(&self, index: usize, edit: impl FnOnce(&mut FakeNode)) {
        let mut state = self.state.lock().unwrap();
        edit(&mut state.nodes[index]);
    }

    pub fn push_node(&self, node: FakeNode) {
        self.state.lock().unwrap().nodes.push(node);
    }

    pub fn node(&self, index: usize) -> FakeNode {
        self.state.lock().unwrap().nodes[index].clone()
    }

    pub fn block_markers(&self, error: HostError) {
        self.state.lock().unwrap().marker_error = Some(error);
    }

    pub fn fail_navigation(&self, error: HostError) {
        self.state.lock().unwrap().navigate_error = Some(error);
    }

    /// Let `reads` more page source reads succeed, then fail every later one with `error`
    pub fn fail_source(&self, reads: usize, error: HostError) {
        let mut state = self.state.lock().unwrap();
        state.source_reads_left = Some(reads);
        state.source_error = Some(error);
    }

    pub fn fail_coordinates(&self, error: HostError) {
        self.state.lock().unwrap().coordinate_errors.push_back(error);
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn queries(&self) -> Vec<Query> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn url(&self) -> String {
        self.state.lock().unwrap().url.clone()
    }

    fn log(&self, event: String) {
        self.state.lock().unwrap().events.push(event);
    }
}

fn matches_text(actual: Option<&str>, wanted: &str) -> bool {
    match (actual, wanted.strip_suffix("...")) {
        (Some(actual), Some(prefix)) => actual.starts_with(prefix.trim()),
        (Some(actual), None) => actual == wanted,
        (None, _) => false,
    }
}

fn matches(node: &FakeNode, query: &Query) -> bool {
    match query {
        Query::Marker { reference, .. } => node.marker.as_deref() == Some(&reference.to_string()),
        Query::RoleName { role, name } => {
            node.role.as_deref() == Some(role.as_str())
                && (node.aria_label.as_deref() == Some(name.as_str())
                    || matches_text(node.text.as_deref(), name))
        }
        Query::Label(label) => {
            node.aria_label.as_deref() == Some(label.as_str())
                || node.label.as_deref() == Some(label.as_str())
        }
        Query::Placeholder(text) => node.placeholder.as_deref() == Some(text.as_str()),
        Query::Name(name) => node.name.as_deref() == Some(name.as_str()),
        Query::DomId(id) => node.dom_id.as_deref() == Some(id.as_str()),
        Query::TextWithin { tag, text } => {
            &node.tag == tag && node.text.as_deref().is_some_and(|t| t.contains(text.as_str()))
        }
    }
}

fn locate(nodes: &[FakeNode], locator: &MarkerLocator) -> Option<usize> {
    nodes.iter().position(|node| {
        node.marker.is_none()
            && match locator {
                MarkerLocator::DomId(id) => node.dom_id.as_deref() == Some(id.as_str()),
                MarkerLocator::Name { tag, name } => {
                    &node.tag == tag && node.name.as_deref() == Some(name.as_str())
                }
                MarkerLocator::Structural(path) => &node.structural_path == path,
                MarkerLocator::Text { tag, text } => {
                    &node.tag == tag
                        && node.text.as_deref().is_some_and(|t| t.contains(text.as_str()))
                }
            }
    })
}

#[async_trait]
impl PageHost for FakePage {
    type Element = FakeHandle;

    async fn navigate(&self, url: &str) -> Result<(), HostError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.navigate_error.clone() {
            return Err(error);
        }
        state.url = url.to_string();
        state.events.push(format!("navigate {}", url));
        Ok(())
    }

    async fn current_url(&self) -> Result<String, HostError> {
        Ok(self.url())
    }

    async fn title(&self) -> Result<String, HostError> {
        Ok(self.state.lock().unwrap().title.clone())
    }

    async fn page_source(&self) -> Result<String, HostError> {
        let mut state = self.state.lock().unwrap();
        match state.source_reads_left {
            Some(0) => {
                if let Some(error) = state.source_error.clone() {
                    return Err(error);
                }
            }
            Some(left) => state.source_reads_left = Some(left - 1),
            None => {}
        }
        Ok(state.markup.clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, HostError> {
        Ok(b"\x89PNG fake".to_vec())
    }

    async fn write_markers(
        &self,
        _attribute: &str,
        plans: &[MarkerPlan],
    ) -> Result<Vec<Option<usize>>, HostError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.marker_error.clone() {
            return Err(error);
        }

        for node in state.nodes.iter_mut() {
            node.marker = None;
        }

        let mut hits = Vec::new();
        for plan in plans {
            let mut hit = None;
            for (i, locator) in plan.locators.iter().enumerate() {
                if let Some(index) = locate(&state.nodes, locator) {
                    state.nodes[index].marker = Some(plan.reference.to_string());
                    hit = Some(i);
                    break;
                }
            }
            hits.push(hit);
        }
        Ok(hits)
    }

    async fn query(&self, query: &Query) -> Result<Vec<FoundElement<FakeHandle>>, HostError> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(query.clone());
        Ok(state
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| matches(node, query))
            .map(|(index, node)| FoundElement {
                handle: FakeHandle(index),
                visible: node.visible,
                enabled: node.enabled,
            })
            .collect())
    }

    async fn click(&self, element: &FakeHandle) -> Result<(), HostError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.nodes[element.0].click_errors.pop_front() {
            state.events.push(format!("click #{} failed", element.0));
            return Err(error);
        }
        state.events.push(format!("click #{}", element.0));
        state.focused = Some(element.0);
        if let Some(url) = state.nodes[element.0].navigates_to.clone() {
            state.url = url;
        }
        Ok(())
    }

    async fn focus(&self, element: &FakeHandle) -> Result<(), HostError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("focus #{}", element.0));
        state.focused = Some(element.0);
        Ok(())
    }

    async fn fill(&self, element: &FakeHandle, text: &str) -> Result<(), HostError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("fill #{} {}", element.0, text));
        state.nodes[element.0].value = text.to_string();
        Ok(())
    }

    async fn type_keys(&self, text: &str) -> Result<(), HostError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("keys {}", text));
        if let Some(index) = state.focused {
            state.nodes[index].value.push_str(text);
        }
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), HostError> {
        self.log(format!("press {}", key));
        Ok(())
    }

    async fn hover(&self, element: &FakeHandle) -> Result<(), HostError> {
        self.log(format!("hover #{}", element.0));
        Ok(())
    }

    async fn scroll_into_view(&self, element: &FakeHandle) -> Result<(), HostError> {
        self.log(format!("scroll-into-view #{}", element.0));
        Ok(())
    }

    async fn click_at(&self, point: Point) -> Result<(), HostError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.coordinate_errors.pop_front() {
            return Err(error);
        }
        state.events.push(format!("click-at {},{}", point.x, point.y));
        Ok(())
    }

    async fn hover_at(&self, point: Point) -> Result<(), HostError> {
        self.log(format!("hover-at {},{}", point.x, point.y));
        Ok(())
    }

    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<(), HostError> {
        self.log(format!("scroll-by {},{}", dx, dy));
        Ok(())
    }
}

/// Oracle that replays a fixed script, then repeats `fallback` (or reports an empty reply)
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<ActionRequest, OracleError>>>,
    fallback: Option<ActionRequest>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    history_lengths: Mutex<Vec<usize>>,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<ActionRequest>) -> Self {
        Self::with_results(replies.into_iter().map(Ok).collect())
    }

    pub fn with_results(replies: Vec<Result<ActionRequest, OracleError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            delay: None,
            calls: AtomicUsize::new(0),
            history_lengths: Mutex::new(Vec::new()),
        }
    }

    /// Replies as the raw text a model would send
    pub fn from_raw(replies: &[&str]) -> Self {
        Self::with_results(
            replies
                .iter()
                .map(|raw| parse_action(raw).map_err(OracleError::from))
                .collect(),
        )
    }

    pub fn repeating(action: ActionRequest) -> Self {
        let mut oracle = Self::new(Vec::new());
        oracle.fallback = Some(action);
        oracle
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// History length seen on each call
    pub fn history_lengths(&self) -> Vec<usize> {
        self.history_lengths.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decide(
        &self,
        _task: &str,
        _snapshot: &PageSnapshot,
        history: &[StepRecord],
    ) -> Result<ActionRequest, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.history_lengths.lock().unwrap().push(history.len());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) => reply,
            None => match &self.fallback {
                Some(action) => Ok(action.clone()),
                None => Err(OracleError::Malformed(webpilot::ActionParseError::Empty)),
            },
        }
    }
}

/// Mock HTML pages for testing
pub mod fixtures {
    pub const ISSUE_TRACKER: &str = r#"
    <!DOCTYPE html>
    <html>
    <head><title>Issues</title></head>
    <body>
        <nav>
            <a href="/issues">Issues</a>
            <a href="/issues/new" id="new-issue">New issue</a>
        </nav>
        <main>
            <input id="title" name="title" placeholder="Issue title">
            <div contenteditable="true" id="description" aria-label="Description"></div>
            <button id="create-btn" aria-label="Create issue">Create</button>
        </main>
    </body>
    </html>
    "#;

    pub const SEARCH_PAGE: &str = r#"
    <!DOCTYPE html>
    <html>
    <head><title>Search</title></head>
    <body>
        <input type="search" name="q" placeholder="Search docs">
        <button>Search</button>
        <a href="/docs/install">Installation guide</a>
    </body>
    </html>
    "#;
}

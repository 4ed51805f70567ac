use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::annotate::AnnotationReport;

/// Output format for CLI results
#[derive(Clone, Copy, Debug, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format for programmatic consumption
    Json,
    /// Human-readable simple format
    Simple,
}

/// Browser viewport dimensions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportSize {
    /// Viewport width in pixels
    pub width: u32,
    /// Viewport height in pixels
    pub height: u32,
}

impl ViewportSize {
    /// Parse viewport size from "WIDTHxHEIGHT" format (e.g., "1920x1080")
    pub fn parse(s: &str) -> Result<Self> {
        let (width, height) = s
            .split_once('x')
            .ok_or_else(|| anyhow::anyhow!("Invalid viewport format. Use WIDTHxHEIGHT (e.g., 1920x1080)"))?;

        let width = width
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid width in viewport size"))?;
        let height = height
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid height in viewport size"))?;

        Ok(ViewportSize { width, height })
    }
}

/// Per-snapshot handle for one discovered element ("bid").
///
/// Ids are assigned from 1 in discovery order and are only meaningful inside
/// the snapshot that produced them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceId(pub u32);

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ReferenceId {
    type Err = anyhow::Error;

    /// Accepts "5" as well as the rendered "[5]" form
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_start_matches('[').trim_end_matches(']').trim();
        let value = trimmed
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid reference id: {}", s))?;
        Ok(ReferenceId(value))
    }
}

/// One interactive candidate discovered on a page snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    /// Snapshot-local reference id
    pub reference_id: ReferenceId,
    /// Lowercase tag name
    pub tag: String,
    /// Explicit ARIA role attribute
    pub role: Option<String>,
    /// Normalized visible text (truncated)
    pub visible_text: Option<String>,
    pub aria_label: Option<String>,
    pub placeholder: Option<String>,
    pub name: Option<String>,
    pub dom_id: Option<String>,
    pub class_list: BTreeSet<String>,
    pub is_content_editable: bool,
    /// `type` attribute of inputs and buttons
    pub input_type: Option<String>,
    pub href: Option<String>,
    /// `data-testid` attribute
    pub test_id: Option<String>,
    /// Text of an associated `<label>`, when one exists
    pub nearby_label: Option<String>,
    pub disabled: bool,
    /// Generated `nth-of-type` CSS path from the document root
    pub structural_path: String,
}

impl ElementDescriptor {
    /// Explicit role, or the implicit role the tag carries in the accessibility tree
    pub fn effective_role(&self) -> Option<String> {
        if let Some(role) = &self.role {
            return Some(role.to_lowercase());
        }

        let implicit = match self.tag.as_str() {
            "button" => Some("button"),
            "a" if self.href.is_some() => Some("link"),
            "textarea" => Some("textbox"),
            "select" => Some("combobox"),
            "option" => Some("option"),
            "input" => match self.input_type.as_deref().unwrap_or("text") {
                "button" | "submit" | "reset" | "image" => Some("button"),
                "checkbox" => Some("checkbox"),
                "radio" => Some("radio"),
                "search" => Some("searchbox"),
                "number" => Some("spinbutton"),
                "range" => Some("slider"),
                "text" | "email" | "tel" | "url" => Some("textbox"),
                _ => None,
            },
            _ => None,
        };

        implicit.map(str::to_string)
    }

    /// The name assistive technology would announce: aria-label first, then visible text
    pub fn accessible_name(&self) -> Option<&str> {
        self.aria_label
            .as_deref()
            .or(self.visible_text.as_deref())
            .filter(|name| !name.trim().is_empty())
    }

    /// Whether the element accepts typed input
    pub fn is_form_field(&self) -> bool {
        if self.is_content_editable {
            return true;
        }
        if matches!(self.tag.as_str(), "input" | "textarea" | "select") {
            return true;
        }
        matches!(
            self.effective_role().as_deref(),
            Some("textbox" | "searchbox" | "combobox")
        )
    }

    /// Compact one-line rendering used in oracle prompts.
    ///
    /// Format: `[bid] tag[type=..] "text" (key="value", ...)`
    pub fn to_compact_string(&self) -> String {
        let mut parts = vec![format!("[{}]", self.reference_id)];

        match &self.input_type {
            Some(kind) => parts.push(format!("{}[type={}]", self.tag, kind)),
            None => parts.push(self.tag.clone()),
        }

        if let Some(text) = &self.visible_text {
            parts.push(format!("\"{}\"", truncate_chars(text, 50)));
        }

        let mut attrs = Vec::new();
        if let Some(role) = &self.role {
            attrs.push(format!("role=\"{}\"", role));
        }
        if let Some(label) = &self.aria_label {
            attrs.push(format!("aria-label=\"{}\"", label));
        }
        if let Some(placeholder) = &self.placeholder {
            attrs.push(format!("placeholder=\"{}\"", placeholder));
        }
        if let Some(label) = &self.nearby_label {
            attrs.push(format!("label=\"{}\"", label));
        }
        if let Some(name) = &self.name {
            attrs.push(format!("name=\"{}\"", name));
        }
        if let Some(id) = &self.dom_id {
            attrs.push(format!("id=\"{}\"", id));
        }
        if let Some(href) = &self.href {
            attrs.push(format!("href=\"{}\"", truncate_chars(href, 30)));
        }
        if let Some(test_id) = &self.test_id {
            attrs.push(format!("data-testid=\"{}\"", test_id));
        }
        if self.is_content_editable {
            attrs.push("contenteditable".to_string());
        }
        if self.disabled {
            attrs.push("disabled".to_string());
        }

        if !attrs.is_empty() {
            parts.push(format!("({})", attrs.join(", ")));
        }

        parts.join(" ")
    }
}

/// Truncate to at most `max` characters, appending "..." when cut
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push_str("...");
    cut
}

/// The unit of perception handed to the decision oracle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Discovered elements in discovery order
    pub elements: Vec<ElementDescriptor>,
    /// Visible page text
    pub page_text: String,
    /// Captured screenshot artifact, if one was stored
    pub screenshot: Option<PathBuf>,
    pub url: String,
    pub title: String,
    /// Outcome of the marker injection pass for this snapshot
    pub markers: AnnotationReport,
}

impl PageSnapshot {
    /// Find a descriptor by reference id
    pub fn element(&self, reference: ReferenceId) -> Option<&ElementDescriptor> {
        self.elements
            .iter()
            .find(|element| element.reference_id == reference)
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            url: self.url.clone(),
            title: self.title.clone(),
            screenshot: self.screenshot.clone(),
            element_count: self.elements.len(),
            markers_injected: self.markers.injected_count(),
        }
    }
}

/// Lightweight reference to the snapshot a step consumed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub url: String,
    pub title: String,
    pub screenshot: Option<PathBuf>,
    pub element_count: usize,
    pub markers_injected: usize,
}

/// Kind of primitive operation requested by the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Click,
    Type,
    Scroll,
    Wait,
    PressKey,
    Hover,
    Finish,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Click => "CLICK",
            ActionKind::Type => "TYPE",
            ActionKind::Scroll => "SCROLL",
            ActionKind::Wait => "WAIT",
            ActionKind::PressKey => "PRESS_KEY",
            ActionKind::Hover => "HOVER",
            ActionKind::Finish => "FINISH",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Viewport pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    /// Signed vertical delta for a scroll of `amount` pixels
    pub fn delta(&self, amount: u32) -> i64 {
        match self {
            ScrollDirection::Up => -(amount as i64),
            ScrollDirection::Down => amount as i64,
        }
    }
}

/// Kind-specific data carried by an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPayload {
    Text(String),
    Scroll { direction: ScrollDirection, amount: u32 },
    Key(String),
}

/// Ways an `ActionRequest` can break its own shape rules
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidAction {
    #[error("FINISH must not carry a target")]
    FinishWithTarget,
    #[error("{0} requires a target reference or coordinates")]
    MissingTarget(ActionKind),
    #[error("TYPE requires text")]
    MissingText,
    #[error("PRESS_KEY requires a key")]
    MissingKey,
}

/// The decision oracle's output for one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub kind: ActionKind,
    pub target: Option<ReferenceId>,
    pub coordinates: Option<Point>,
    pub payload: Option<ActionPayload>,
    pub reasoning: Option<String>,
}

impl ActionRequest {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            target: None,
            coordinates: None,
            payload: None,
            reasoning: None,
        }
    }

    pub fn finish() -> Self {
        Self::new(ActionKind::Finish)
    }

    pub fn click(target: ReferenceId) -> Self {
        Self::new(ActionKind::Click).with_target(target)
    }

    pub fn type_text(target: ReferenceId, text: impl Into<String>) -> Self {
        Self::new(ActionKind::Type)
            .with_target(target)
            .with_payload(ActionPayload::Text(text.into()))
    }

    pub fn with_target(mut self, target: ReferenceId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_coordinates(mut self, x: i64, y: i64) -> Self {
        self.coordinates = Some(Point { x, y });
        self
    }

    pub fn with_payload(mut self, payload: ActionPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Some(ActionPayload::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match &self.payload {
            Some(ActionPayload::Key(key)) => Some(key),
            _ => None,
        }
    }

    /// Scroll direction and amount, defaulting to 300px down
    pub fn scroll(&self) -> (ScrollDirection, u32) {
        match &self.payload {
            Some(ActionPayload::Scroll { direction, amount }) => (*direction, *amount),
            _ => (ScrollDirection::Down, 300),
        }
    }

    /// Check the shape rules for the action kind
    pub fn validate(&self) -> std::result::Result<(), InvalidAction> {
        match self.kind {
            ActionKind::Finish if self.target.is_some() => Err(InvalidAction::FinishWithTarget),
            ActionKind::Click | ActionKind::Type | ActionKind::Hover
                if self.target.is_none() && self.coordinates.is_none() =>
            {
                Err(InvalidAction::MissingTarget(self.kind))
            }
            ActionKind::Type if self.text().is_none() => Err(InvalidAction::MissingText),
            ActionKind::PressKey if self.key().is_none() => Err(InvalidAction::MissingKey),
            _ => Ok(()),
        }
    }
}

pub const METHOD_COORDINATE: &str = "coordinate";
pub const METHOD_VIEWPORT: &str = "viewport";
pub const METHOD_TIMER: &str = "timer";
pub const METHOD_KEYBOARD: &str = "keyboard";

/// Result of executing one `ActionRequest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub succeeded: bool,
    /// Resolution strategy that worked, or "coordinate" and friends
    pub method_used: Option<String>,
    /// Present iff the action did not succeed
    pub error_detail: Option<String>,
    /// Number of execution attempts made
    pub attempts: u32,
    /// Non-fatal observations such as multi-match warnings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl ActionOutcome {
    pub fn success(method: impl Into<String>, attempts: u32) -> Self {
        Self {
            succeeded: true,
            method_used: Some(method.into()),
            error_detail: None,
            attempts,
            diagnostics: Vec::new(),
        }
    }

    pub fn failure(method: Option<String>, detail: impl Into<String>, attempts: u32) -> Self {
        Self {
            succeeded: false,
            method_used: method,
            error_detail: Some(detail.into()),
            attempts,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<String>) -> Self {
        self.diagnostics.extend(diagnostics);
        self
    }
}

/// One entry in session history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based ordinal
    pub index: u32,
    pub snapshot: SnapshotSummary,
    /// Absent when the oracle produced no usable action
    pub action: Option<ActionRequest>,
    /// Absent for FINISH, which is never executed
    pub outcome: Option<ActionOutcome>,
    pub url_after: String,
    pub title_after: String,
    pub recorded_at: DateTime<Utc>,
}

impl StepRecord {
    /// `(kind, target)` of a failed executed action, used by the loop guard
    pub fn failure_key(&self) -> Option<(ActionKind, Option<ReferenceId>)> {
        match (&self.action, &self.outcome) {
            (Some(action), Some(outcome)) if !outcome.succeeded => {
                Some((action.kind, action.target))
            }
            _ => None,
        }
    }
}

/// Lifecycle status of a task session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    StepBudgetExceeded,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Running => "RUNNING",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Failed => "FAILED",
            SessionStatus::StepBudgetExceeded => "STEP_BUDGET_EXCEEDED",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

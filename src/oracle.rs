//! Decision oracle seam and the tolerant parser for its replies.
//!
//! The oracle sees a snapshot plus history and answers with one action. Its reply is
//! untrusted text: anything that does not parse into a valid `ActionRequest` is a
//! contract violation and ends the session.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::prompt;
use crate::types::{
    ActionKind, ActionPayload, ActionRequest, ElementDescriptor, InvalidAction, PageSnapshot,
    ReferenceId, ScrollDirection, StepRecord,
};

const DEFAULT_SCROLL_AMOUNT: u32 = 300;
const HISTORY_WINDOW: usize = 5;
const PROMPT_ELEMENT_LIMIT: usize = 50;
const PROMPT_TEXT_LIMIT: usize = 1500;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionParseError {
    #[error("empty response")]
    Empty,
    #[error("response is not a JSON object: {0}")]
    NotJson(String),
    #[error("missing \"action\" field")]
    MissingAction,
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("invalid '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error(transparent)]
    Invalid(#[from] InvalidAction),
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Transport(String),
    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("oracle did not answer within {0:?}")]
    Timeout(Duration),
    #[error("malformed oracle response: {0}")]
    Malformed(#[from] ActionParseError),
}

impl OracleError {
    /// The oracle answered, but not with a usable action
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, OracleError::Malformed(_))
    }
}

/// Chooses the next action. Implementations must not touch the page.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(
        &self,
        task: &str,
        snapshot: &PageSnapshot,
        history: &[StepRecord],
    ) -> Result<ActionRequest, OracleError>;
}

/// Parse a raw oracle reply into a validated `ActionRequest`.
///
/// Accepts code-fenced JSON, prose around a single object, numeric or string `bid`,
/// and `TASK_COMPLETE`/`DONE` as aliases for FINISH.
pub fn parse_action(raw: &str) -> Result<ActionRequest, ActionParseError> {
    let body = strip_fences(raw.trim());
    if body.is_empty() {
        return Err(ActionParseError::Empty);
    }

    let json = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => return Err(ActionParseError::NotJson(preview(body))),
    };
    let object: Map<String, Value> = match serde_json::from_str(json) {
        Ok(Value::Object(object)) => object,
        Ok(_) => return Err(ActionParseError::NotJson(preview(body))),
        Err(e) => return Err(ActionParseError::NotJson(e.to_string())),
    };

    let action = object
        .get("action")
        .and_then(Value::as_str)
        .ok_or(ActionParseError::MissingAction)?;
    let kind = parse_kind(action)?;
    let mut request = ActionRequest::new(kind);

    if let Some(reasoning) = object.get("reasoning").and_then(Value::as_str) {
        request = request.with_reasoning(reasoning);
    }

    // FINISH carries nothing else
    if kind == ActionKind::Finish {
        return Ok(request);
    }

    if let Some(target) = parse_reference(&object)? {
        request = request.with_target(target);
    }
    match (number(&object, "x")?, number(&object, "y")?) {
        (Some(x), Some(y)) => request = request.with_coordinates(x, y),
        (None, None) => {}
        _ => {
            return Err(ActionParseError::InvalidField {
                field: "x/y",
                reason: "both coordinates are required".to_string(),
            });
        }
    }

    match kind {
        ActionKind::Type => {
            if let Some(text) = object.get("text").and_then(Value::as_str) {
                request = request.with_payload(ActionPayload::Text(text.to_string()));
            }
        }
        ActionKind::PressKey => {
            if let Some(key) = object.get("key").and_then(Value::as_str) {
                request = request.with_payload(ActionPayload::Key(key.to_string()));
            }
        }
        ActionKind::Scroll => {
            let direction = match object.get("direction").and_then(Value::as_str) {
                None => ScrollDirection::Down,
                Some(value) => match value.to_lowercase().as_str() {
                    "up" => ScrollDirection::Up,
                    "down" => ScrollDirection::Down,
                    other => {
                        return Err(ActionParseError::InvalidField {
                            field: "direction",
                            reason: format!("expected up or down, got '{}'", other),
                        });
                    }
                },
            };
            let amount = match number(&object, "amount")? {
                Some(amount) if amount > 0 => {
                    u32::try_from(amount).map_err(|_| ActionParseError::InvalidField {
                        field: "amount",
                        reason: format!("{} is too large", amount),
                    })?
                }
                Some(_) => {
                    return Err(ActionParseError::InvalidField {
                        field: "amount",
                        reason: "must be positive".to_string(),
                    });
                }
                None => DEFAULT_SCROLL_AMOUNT,
            };
            request = request.with_payload(ActionPayload::Scroll { direction, amount });
        }
        _ => {}
    }

    request.validate()?;
    Ok(request)
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line, then the closing fence
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}

fn parse_kind(action: &str) -> Result<ActionKind, ActionParseError> {
    let normalized = action.trim().to_uppercase().replace([' ', '-'], "_");
    let kind = match normalized.as_str() {
        "CLICK" => ActionKind::Click,
        "TYPE" | "FILL" => ActionKind::Type,
        "SCROLL" => ActionKind::Scroll,
        "WAIT" => ActionKind::Wait,
        "PRESS_KEY" | "PRESS" | "KEY" => ActionKind::PressKey,
        "HOVER" => ActionKind::Hover,
        "FINISH" | "TASK_COMPLETE" | "DONE" => ActionKind::Finish,
        _ => return Err(ActionParseError::UnknownAction(action.to_string())),
    };
    Ok(kind)
}

fn parse_reference(object: &Map<String, Value>) -> Result<Option<ReferenceId>, ActionParseError> {
    let value = match object.get("bid").or_else(|| object.get("target")) {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };

    let invalid = |reason: String| ActionParseError::InvalidField {
        field: "bid",
        reason,
    };
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(|n| Some(ReferenceId(n)))
            .ok_or_else(|| invalid(format!("{} is not a reference id", n))),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .parse::<ReferenceId>()
            .map(Some)
            .map_err(|e| invalid(e.to_string())),
        other => Err(invalid(format!("unexpected value {}", other))),
    }
}

/// Integer field that may arrive as a float or numeric string
fn number(object: &Map<String, Value>, field: &'static str) -> Result<Option<i64>, ActionParseError> {
    let invalid = |reason: String| ActionParseError::InvalidField { field, reason };
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .map(Some)
            .ok_or_else(|| invalid(n.to_string())),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(|f| Some(f.round() as i64))
            .map_err(|_| invalid(format!("'{}' is not a number", s))),
        Some(other) => Err(invalid(format!("unexpected value {}", other))),
    }
}

/// Request body sent to an HTTP decision service
#[derive(Debug, Serialize)]
struct DecisionRequest<'a> {
    task: &'a str,
    step: usize,
    url: &'a str,
    title: &'a str,
    screenshot: Option<String>,
    elements: &'a [ElementDescriptor],
    elements_summary: String,
    page_text: String,
    history: String,
}

/// Oracle backed by an HTTP endpoint that answers with the action JSON, either as the
/// whole body or in a `content` field
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpOracle {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let endpoint = endpoint.into();
        url::Url::parse(&endpoint)
            .map_err(|e| anyhow::anyhow!("Invalid oracle endpoint '{}': {}", endpoint, e))?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl DecisionOracle for HttpOracle {
    async fn decide(
        &self,
        task: &str,
        snapshot: &PageSnapshot,
        history: &[StepRecord],
    ) -> Result<ActionRequest, OracleError> {
        let body = DecisionRequest {
            task,
            step: history.len() + 1,
            url: &snapshot.url,
            title: &snapshot.title,
            screenshot: snapshot
                .screenshot
                .as_ref()
                .map(|path| path.display().to_string()),
            elements: &snapshot.elements,
            elements_summary: prompt::render_elements(snapshot, PROMPT_ELEMENT_LIMIT),
            page_text: prompt::render_page_text(snapshot, PROMPT_TEXT_LIMIT),
            history: prompt::render_history(history, HISTORY_WINDOW),
        };

        debug!("Requesting decision from {}", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
                body: preview(&text),
            });
        }

        let content = match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(object)) => match object.get("content").and_then(Value::as_str) {
                Some(content) => content.to_string(),
                None => text,
            },
            _ => text,
        };

        let action = parse_action(&content)?;
        info!(
            "Oracle chose {}{}",
            prompt::describe_action(&action),
            action
                .reasoning
                .as_deref()
                .map(|r| format!(" ({})", r))
                .unwrap_or_default()
        );
        Ok(action)
    }
}

#[cfg(test)]
#[path = "oracle_test.rs"]
mod oracle_test;

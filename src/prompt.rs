//! Text renderings of snapshots and history, shared by oracle prompts and transcripts.

use crate::types::{truncate_chars, ActionKind, ActionRequest, PageSnapshot, StepRecord};

/// Numbered element list, capped at `limit` entries
pub fn render_elements(snapshot: &PageSnapshot, limit: usize) -> String {
    if snapshot.elements.is_empty() {
        return "No actionable elements found.".to_string();
    }

    let mut lines = vec!["Available elements:".to_string()];
    lines.extend(
        snapshot
            .elements
            .iter()
            .take(limit)
            .map(|element| element.to_compact_string()),
    );
    if snapshot.elements.len() > limit {
        lines.push(format!(
            "... and {} more elements",
            snapshot.elements.len() - limit
        ));
    }
    lines.join("\n")
}

pub fn render_page_text(snapshot: &PageSnapshot, max_chars: usize) -> String {
    let text = snapshot.page_text.trim();
    if text.is_empty() {
        "No visible text on page.".to_string()
    } else {
        truncate_chars(text, max_chars)
    }
}

/// Short form of an action, e.g. `TYPE [3] "hello"`
pub fn describe_action(action: &ActionRequest) -> String {
    let mut parts = vec![action.kind.to_string()];

    if let Some(target) = action.target {
        parts.push(format!("[{}]", target));
    }
    if let Some(point) = action.coordinates {
        parts.push(format!("@({}, {})", point.x, point.y));
    }
    match action.kind {
        ActionKind::Type => {
            if let Some(text) = action.text() {
                parts.push(format!("\"{}\"", truncate_chars(text, 40)));
            }
        }
        ActionKind::PressKey => {
            if let Some(key) = action.key() {
                parts.push(key.to_string());
            }
        }
        ActionKind::Scroll => {
            let (direction, amount) = action.scroll();
            parts.push(format!("{:?} {}px", direction, amount).to_lowercase());
        }
        _ => {}
    }

    parts.join(" ")
}

/// One history line: marker, ordinal, action and how it ended
pub fn describe_step(record: &StepRecord) -> String {
    let action = record
        .action
        .as_ref()
        .map(describe_action)
        .unwrap_or_else(|| "(no action)".to_string());

    match &record.outcome {
        None => format!("• Step {}: {}", record.index, action),
        Some(outcome) if outcome.succeeded => format!(
            "✓ Step {}: {} (method: {})",
            record.index,
            action,
            outcome.method_used.as_deref().unwrap_or("-")
        ),
        Some(outcome) => format!(
            "✗ Step {}: {} - {}",
            record.index,
            action,
            outcome.error_detail.as_deref().unwrap_or("failed")
        ),
    }
}

/// Last `last_n` steps, oldest first
pub fn render_history(history: &[StepRecord], last_n: usize) -> String {
    if history.is_empty() {
        return "No previous actions.".to_string();
    }

    let start = history.len().saturating_sub(last_n);
    let mut lines = vec!["Previous actions:".to_string()];
    lines.extend(history[start..].iter().map(describe_step));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::AnnotationReport;
    use crate::types::{ActionOutcome, ReferenceId, ScrollDirection, ActionPayload};
    use chrono::Utc;

    fn snapshot() -> PageSnapshot {
        PageSnapshot {
            elements: Vec::new(),
            page_text: "  ".to_string(),
            screenshot: None,
            url: "https://example.test/".to_string(),
            title: "Example".to_string(),
            markers: AnnotationReport::default(),
        }
    }

    fn record(index: u32, action: ActionRequest, outcome: Option<ActionOutcome>) -> StepRecord {
        StepRecord {
            index,
            snapshot: snapshot().summary(),
            action: Some(action),
            outcome,
            url_after: "https://example.test/".to_string(),
            title_after: "Example".to_string(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_renderings() {
        assert_eq!(render_elements(&snapshot(), 10), "No actionable elements found.");
        assert_eq!(render_page_text(&snapshot(), 10), "No visible text on page.");
        assert_eq!(render_history(&[], 5), "No previous actions.");
    }

    #[test]
    fn test_describe_action() {
        assert_eq!(
            describe_action(&ActionRequest::type_text(ReferenceId(3), "hello")),
            "TYPE [3] \"hello\""
        );
        let scroll = ActionRequest::new(ActionKind::Scroll).with_payload(ActionPayload::Scroll {
            direction: ScrollDirection::Up,
            amount: 200,
        });
        assert_eq!(describe_action(&scroll), "SCROLL up 200px");
        assert_eq!(
            describe_action(&ActionRequest::new(ActionKind::Click).with_coordinates(10, 20)),
            "CLICK @(10, 20)"
        );
    }

    #[test]
    fn test_history_keeps_last_steps() {
        let history = vec![
            record(
                1,
                ActionRequest::click(ReferenceId(1)),
                Some(ActionOutcome::success("marker", 1)),
            ),
            record(
                2,
                ActionRequest::click(ReferenceId(2)),
                Some(ActionOutcome::failure(None, "unresolvable target", 0)),
            ),
            record(3, ActionRequest::finish(), None),
        ];

        assert_eq!(
            render_history(&history, 2),
            "Previous actions:\n✗ Step 2: CLICK [2] - unresolvable target\n• Step 3: FINISH"
        );
        assert_eq!(
            describe_step(&history[0]),
            "✓ Step 1: CLICK [1] (method: marker)"
        );
    }
}

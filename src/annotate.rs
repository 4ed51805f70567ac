//! Marker injection: writes `data-bid` on live elements so later lookups are direct.
//!
//! Injection is an accelerator. Any failure here degrades to "no markers" and the
//! resolver falls through to its semantic strategies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::host::{HostError, PageHost};
use crate::types::{ElementDescriptor, ReferenceId};

/// Attribute carrying the snapshot-local reference id
pub const MARKER_ATTRIBUTE: &str = "data-bid";

/// One way to find the live element behind a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MarkerLocator {
    DomId(String),
    Name { tag: String, name: String },
    Structural(String),
    Text { tag: String, text: String },
}

impl MarkerLocator {
    pub fn label(&self) -> &'static str {
        match self {
            MarkerLocator::DomId(_) => "id",
            MarkerLocator::Name { .. } => "name",
            MarkerLocator::Structural(_) => "structural",
            MarkerLocator::Text { .. } => "text",
        }
    }
}

/// Locators for one descriptor, tried in order until one hits an unmarked element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerPlan {
    pub reference: ReferenceId,
    pub locators: Vec<MarkerLocator>,
}

impl MarkerPlan {
    pub fn for_descriptor(descriptor: &ElementDescriptor) -> Self {
        let mut locators = Vec::new();

        if let Some(id) = &descriptor.dom_id {
            locators.push(MarkerLocator::DomId(id.clone()));
        }
        if let Some(name) = &descriptor.name {
            locators.push(MarkerLocator::Name {
                tag: descriptor.tag.clone(),
                name: name.clone(),
            });
        }
        if !descriptor.structural_path.is_empty() {
            locators.push(MarkerLocator::Structural(descriptor.structural_path.clone()));
        }
        // Truncated text can still match by containment once the ellipsis is gone
        if let Some(text) = &descriptor.visible_text {
            let text = text.trim_end_matches("...").trim();
            if !text.is_empty() {
                locators.push(MarkerLocator::Text {
                    tag: descriptor.tag.clone(),
                    text: text.to_string(),
                });
            }
        }

        Self {
            reference: descriptor.reference_id,
            locators,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The page refused the mutation (CSP, trusted types)
    PolicyRejected(String),
    /// No locator found an unmarked element
    NotLocated,
    HostFailure(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PolicyRejected(detail) => write!(f, "rejected by page policy ({})", detail),
            SkipReason::NotLocated => f.write_str("element not located"),
            SkipReason::HostFailure(detail) => write!(f, "host error ({})", detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerState {
    /// Marker written; `via` names the locator that found the element
    Injected { via: String },
    Skipped(SkipReason),
}

/// Per-reference outcome of one injection pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationReport {
    states: BTreeMap<ReferenceId, MarkerState>,
}

impl AnnotationReport {
    /// Every reference skipped for the same reason
    pub fn skipped_all<'a>(
        references: impl IntoIterator<Item = &'a ReferenceId>,
        reason: SkipReason,
    ) -> Self {
        Self {
            states: references
                .into_iter()
                .map(|reference| (*reference, MarkerState::Skipped(reason.clone())))
                .collect(),
        }
    }

    pub fn record(&mut self, reference: ReferenceId, state: MarkerState) {
        self.states.insert(reference, state);
    }

    pub fn state(&self, reference: ReferenceId) -> Option<&MarkerState> {
        self.states.get(&reference)
    }

    pub fn is_injected(&self, reference: ReferenceId) -> bool {
        matches!(self.state(reference), Some(MarkerState::Injected { .. }))
    }

    pub fn injected_count(&self) -> usize {
        self.states
            .values()
            .filter(|state| matches!(state, MarkerState::Injected { .. }))
            .count()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Run one injection pass over the catalog. Never fails: problems are reported per element.
pub async fn annotate<H>(host: &H, elements: &[ElementDescriptor]) -> AnnotationReport
where
    H: PageHost + ?Sized,
{
    if elements.is_empty() {
        return AnnotationReport::default();
    }

    let plans: Vec<MarkerPlan> = elements.iter().map(MarkerPlan::for_descriptor).collect();
    let references: Vec<ReferenceId> = plans.iter().map(|plan| plan.reference).collect();

    let hits = match host.write_markers(MARKER_ATTRIBUTE, &plans).await {
        Ok(hits) => hits,
        Err(HostError::PolicyRejected(detail)) => {
            warn!(
                "Marker injection blocked by page policy, continuing without markers: {}",
                detail
            );
            return AnnotationReport::skipped_all(&references, SkipReason::PolicyRejected(detail));
        }
        Err(e) => {
            warn!("Marker injection failed, continuing without markers: {}", e);
            return AnnotationReport::skipped_all(
                &references,
                SkipReason::HostFailure(e.to_string()),
            );
        }
    };

    let mut report = AnnotationReport::default();
    for (index, plan) in plans.iter().enumerate() {
        let hit = hits.get(index).copied().flatten();
        let state = match hit.and_then(|i| plan.locators.get(i)) {
            Some(locator) => MarkerState::Injected {
                via: locator.label().to_string(),
            },
            None => {
                debug!("No live element found for [{}]", plan.reference);
                MarkerState::Skipped(SkipReason::NotLocated)
            }
        };
        report.record(plan.reference, state);
    }

    info!(
        "Injected {} of {} element markers",
        report.injected_count(),
        plans.len()
    );
    report
}

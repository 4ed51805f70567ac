//! Hybrid element resolution: marker first, then semantic and attribute lookups.
//!
//! Strategies run in a fixed order and stop at the first one that yields a visible,
//! enabled element. A strategy that errors or times out counts as "no match".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::annotate::{AnnotationReport, MarkerState, MARKER_ATTRIBUTE};
use crate::config::{PilotConfig, StrategyTimeouts};
use crate::host::{PageHost, Query};
use crate::types::{ElementDescriptor, ReferenceId};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    Marker,
    RoleLabel,
    AriaLabel,
    Placeholder,
    Name,
    DomId,
    Text,
}

impl ResolutionStrategy {
    /// Order in which strategies are attempted
    pub const CHAIN: [ResolutionStrategy; 7] = [
        ResolutionStrategy::Marker,
        ResolutionStrategy::RoleLabel,
        ResolutionStrategy::AriaLabel,
        ResolutionStrategy::Placeholder,
        ResolutionStrategy::Name,
        ResolutionStrategy::DomId,
        ResolutionStrategy::Text,
    ];

    /// Name recorded as `method_used`
    pub fn name(&self) -> &'static str {
        match self {
            ResolutionStrategy::Marker => "marker",
            ResolutionStrategy::RoleLabel => "role+label",
            ResolutionStrategy::AriaLabel => "aria-label",
            ResolutionStrategy::Placeholder => "placeholder",
            ResolutionStrategy::Name => "name",
            ResolutionStrategy::DomId => "id",
            ResolutionStrategy::Text => "text",
        }
    }

    fn timeout(&self, timeouts: &StrategyTimeouts) -> Duration {
        match self {
            ResolutionStrategy::Marker => timeouts.marker,
            ResolutionStrategy::RoleLabel | ResolutionStrategy::AriaLabel => timeouts.semantic,
            ResolutionStrategy::Placeholder | ResolutionStrategy::Name | ResolutionStrategy::DomId => {
                timeouts.attribute
            }
            ResolutionStrategy::Text => timeouts.text,
        }
    }

    /// Build the host query for `descriptor`, or say why the strategy does not apply
    pub fn query_for(
        &self,
        descriptor: &ElementDescriptor,
        markers: &AnnotationReport,
    ) -> Result<Query, String> {
        match self {
            ResolutionStrategy::Marker => match markers.state(descriptor.reference_id) {
                Some(MarkerState::Injected { .. }) => Ok(Query::Marker {
                    attribute: MARKER_ATTRIBUTE.to_string(),
                    reference: descriptor.reference_id,
                }),
                Some(MarkerState::Skipped(reason)) => Err(format!("no marker: {}", reason)),
                None => Err("no marker injected".to_string()),
            },
            ResolutionStrategy::RoleLabel => {
                match (descriptor.effective_role(), descriptor.accessible_name()) {
                    (Some(role), Some(name)) => Ok(Query::RoleName {
                        role,
                        name: name.to_string(),
                    }),
                    (None, _) => Err("no role".to_string()),
                    (_, None) => Err("no accessible name".to_string()),
                }
            }
            ResolutionStrategy::AriaLabel => descriptor
                .aria_label
                .as_ref()
                .or(descriptor.nearby_label.as_ref())
                .map(|label| Query::Label(label.clone()))
                .ok_or_else(|| "no label".to_string()),
            ResolutionStrategy::Placeholder => {
                if !descriptor.is_form_field() {
                    return Err("not a form field".to_string());
                }
                descriptor
                    .placeholder
                    .as_ref()
                    .map(|text| Query::Placeholder(text.clone()))
                    .ok_or_else(|| "no placeholder".to_string())
            }
            ResolutionStrategy::Name => descriptor
                .name
                .as_ref()
                .map(|name| Query::Name(name.clone()))
                .ok_or_else(|| "no name attribute".to_string()),
            ResolutionStrategy::DomId => descriptor
                .dom_id
                .as_ref()
                .map(|id| Query::DomId(id.clone()))
                .ok_or_else(|| "no id".to_string()),
            ResolutionStrategy::Text => {
                // Containment on truncated text would type into the wrong paragraph
                if descriptor.is_content_editable {
                    return Err("text lookup disabled for content-editable targets".to_string());
                }
                descriptor
                    .visible_text
                    .as_deref()
                    .map(|text| text.trim_end_matches("...").trim())
                    .filter(|text| !text.is_empty())
                    .map(|text| Query::TextWithin {
                        tag: descriptor.tag.clone(),
                        text: text.to_string(),
                    })
                    .ok_or_else(|| "no visible text".to_string())
            }
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A strategy that did not produce an element, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub strategy: ResolutionStrategy,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Resolved<E> {
    pub handle: E,
    pub strategy: ResolutionStrategy,
    /// Usable matches the winning strategy found
    pub match_count: usize,
    /// Strategies tried before the winner
    pub skipped: Vec<StrategyAttempt>,
    pub diagnostics: Vec<String>,
}

/// Every strategy failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionFailure {
    pub reference: ReferenceId,
    pub attempts: Vec<StrategyAttempt>,
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attempts: Vec<String> = self
            .attempts
            .iter()
            .map(|attempt| format!("{}: {}", attempt.strategy, attempt.reason))
            .collect();
        write!(
            f,
            "no strategy resolved [{}] ({})",
            self.reference,
            attempts.join("; ")
        )
    }
}

#[derive(Debug, Clone)]
pub enum Resolution<E> {
    Resolved(Resolved<E>),
    NotFound(ResolutionFailure),
}

#[derive(Debug, Clone)]
pub struct Resolver {
    timeouts: StrategyTimeouts,
}

impl Resolver {
    pub fn new(timeouts: StrategyTimeouts) -> Self {
        Self { timeouts }
    }

    pub fn from_config(config: &PilotConfig) -> Self {
        Self::new(config.strategy_timeouts.clone())
    }

    /// Strategies eligible for `descriptor`; text is never used on content-editable targets
    pub fn chain_for(descriptor: &ElementDescriptor) -> Vec<ResolutionStrategy> {
        ResolutionStrategy::CHAIN
            .iter()
            .copied()
            .filter(|strategy| {
                !(descriptor.is_content_editable && *strategy == ResolutionStrategy::Text)
            })
            .collect()
    }

    pub async fn resolve<H>(
        &self,
        host: &H,
        descriptor: &ElementDescriptor,
        markers: &AnnotationReport,
    ) -> Resolution<H::Element>
    where
        H: PageHost + ?Sized,
    {
        let mut attempts = Vec::new();

        for strategy in Self::chain_for(descriptor) {
            let query = match strategy.query_for(descriptor, markers) {
                Ok(query) => query,
                Err(reason) => {
                    debug!("[{}] {} not applicable: {}", descriptor.reference_id, strategy, reason);
                    attempts.push(StrategyAttempt { strategy, reason });
                    continue;
                }
            };

            match self.run(host, &query, strategy.timeout(&self.timeouts)).await {
                Ok(mut matches) => {
                    let match_count = matches.len();
                    let mut diagnostics = Vec::new();
                    if match_count > 1 {
                        let message = format!(
                            "{} matched {} elements for [{}] ({}); using the first in document order",
                            strategy, match_count, descriptor.reference_id, query
                        );
                        warn!("{}", message);
                        diagnostics.push(message);
                    }

                    info!(
                        "Resolved [{}] via {} ({})",
                        descriptor.reference_id, strategy, query
                    );
                    return Resolution::Resolved(Resolved {
                        handle: matches.swap_remove(0),
                        strategy,
                        match_count,
                        skipped: attempts,
                        diagnostics,
                    });
                }
                Err(reason) => {
                    debug!(
                        "[{}] {} failed ({}): {}",
                        descriptor.reference_id, strategy, query, reason
                    );
                    attempts.push(StrategyAttempt { strategy, reason });
                }
            }
        }

        let failure = ResolutionFailure {
            reference: descriptor.reference_id,
            attempts,
        };
        warn!("{}", failure);
        Resolution::NotFound(failure)
    }

    /// Poll `query` until it yields usable elements or `timeout` elapses
    async fn run<H>(&self, host: &H, query: &Query, timeout: Duration) -> Result<Vec<H::Element>, String>
    where
        H: PageHost + ?Sized,
    {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let found = match tokio::time::timeout(remaining, host.query(query)).await {
                Err(_) => return Err(format!("timed out after {}ms", timeout.as_millis())),
                Ok(Err(e)) => return Err(e.to_string()),
                Ok(Ok(found)) => found,
            };

            let total = found.len();
            let usable: Vec<H::Element> = found
                .into_iter()
                .filter(|element| element.is_usable())
                .map(|element| element.handle)
                .collect();
            if !usable.is_empty() {
                return Ok(usable);
            }

            let reason = if total == 0 {
                "no match".to_string()
            } else {
                format!("{} match(es), none visible and enabled", total)
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(reason);
            }
            tokio::time::sleep(remaining.min(POLL_INTERVAL)).await;
        }
    }
}

#[cfg(test)]
#[path = "resolver_test.rs"]
mod resolver_test;

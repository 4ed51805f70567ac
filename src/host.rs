//! Browser host seam: everything the core needs from a live page.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::annotate::MarkerPlan;
use crate::types::{Point, ReferenceId};

/// Failures reported by a browser host
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    /// The page's security policy refused a script or markup mutation
    #[error("Page policy rejected the operation: {0}")]
    PolicyRejected(String),
    /// The element was replaced or removed from the document
    #[error("Element is stale or detached: {0}")]
    Detached(String),
    /// The element exists but cannot receive input right now (covered, animating)
    #[error("Element is not interactable: {0}")]
    NotInteractable(String),
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Operation timed out: {0}")]
    Timeout(String),
    #[error("Browser host error: {0}")]
    Other(String),
}

impl HostError {
    /// Errors worth another attempt after a short delay
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HostError::Detached(_) | HostError::NotInteractable(_) | HostError::Timeout(_)
        )
    }

    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, HostError::PolicyRejected(_))
    }

    /// Classify a raw driver error message
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("content security policy")
            || lower.contains("trustedhtml")
            || lower.contains("trusted type")
            || lower.contains("unsafe-eval")
            || lower.contains("securityerror")
            || lower.contains("evalerror")
        {
            HostError::PolicyRejected(message)
        } else if lower.contains("stale element")
            || lower.contains("detached")
            || lower.contains("not attached")
        {
            HostError::Detached(message)
        } else if lower.contains("not interactable")
            || lower.contains("click intercepted")
            || lower.contains("would receive the click")
        {
            HostError::NotInteractable(message)
        } else if lower.contains("timeout") || lower.contains("timed out") {
            HostError::Timeout(message)
        } else if lower.contains("invalid selector") || lower.contains("invalid xpath") {
            HostError::InvalidQuery(message)
        } else {
            HostError::Other(message)
        }
    }
}

/// Closed set of element lookups a host must support
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    /// Elements carrying `attribute="reference"`
    Marker {
        attribute: String,
        reference: ReferenceId,
    },
    /// Elements whose explicit or implicit role is `role` and whose accessible name is `name`
    RoleName { role: String, name: String },
    /// Elements labelled `label` via aria-label or an associated `<label>`
    Label(String),
    Placeholder(String),
    Name(String),
    DomId(String),
    /// `tag` elements whose normalized text contains `text`
    TextWithin { tag: String, text: String },
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Marker {
                attribute,
                reference,
            } => write!(f, "[{}=\"{}\"]", attribute, reference),
            Query::RoleName { role, name } => write!(f, "role={} name=\"{}\"", role, name),
            Query::Label(label) => write!(f, "label=\"{}\"", label),
            Query::Placeholder(text) => write!(f, "placeholder=\"{}\"", text),
            Query::Name(name) => write!(f, "[name=\"{}\"]", name),
            Query::DomId(id) => write!(f, "#{}", id),
            Query::TextWithin { tag, text } => write!(f, "{} has-text \"{}\"", tag, text),
        }
    }
}

/// A live element returned by a query, with the state resolution cares about
#[derive(Debug, Clone)]
pub struct FoundElement<E> {
    pub handle: E,
    pub visible: bool,
    pub enabled: bool,
}

impl<E> FoundElement<E> {
    pub fn is_usable(&self) -> bool {
        self.visible && self.enabled
    }
}

/// A live page the core can perceive and act on.
///
/// Implementations assume a single writer: the loop never issues two calls at once.
#[async_trait]
pub trait PageHost: Send + Sync {
    type Element: Clone + fmt::Debug + Send + Sync;

    async fn navigate(&self, url: &str) -> Result<(), HostError>;

    async fn current_url(&self) -> Result<String, HostError>;

    async fn title(&self) -> Result<String, HostError>;

    /// Serialized markup of the current document
    async fn page_source(&self) -> Result<String, HostError>;

    /// PNG bytes of the viewport
    async fn screenshot(&self) -> Result<Vec<u8>, HostError>;

    /// Clear markers from earlier passes, then for each plan write `attribute` on the
    /// first locator that finds a not-yet-marked element. Returns the index of the
    /// winning locator per plan.
    async fn write_markers(
        &self,
        attribute: &str,
        plans: &[MarkerPlan],
    ) -> Result<Vec<Option<usize>>, HostError>;

    /// Single lookup, matches in document order. Polling is the caller's job.
    async fn query(&self, query: &Query) -> Result<Vec<FoundElement<Self::Element>>, HostError>;

    async fn click(&self, element: &Self::Element) -> Result<(), HostError>;

    async fn focus(&self, element: &Self::Element) -> Result<(), HostError>;

    /// Value assignment with input/change events
    async fn fill(&self, element: &Self::Element, text: &str) -> Result<(), HostError>;

    /// Keystroke simulation into whatever has focus
    async fn type_keys(&self, text: &str) -> Result<(), HostError>;

    async fn press_key(&self, key: &str) -> Result<(), HostError>;

    async fn hover(&self, element: &Self::Element) -> Result<(), HostError>;

    async fn scroll_into_view(&self, element: &Self::Element) -> Result<(), HostError>;

    async fn click_at(&self, point: Point) -> Result<(), HostError>;

    async fn hover_at(&self, point: Point) -> Result<(), HostError>;

    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<(), HostError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(
            HostError::from_message("Refused to evaluate: violates Content Security Policy")
                .is_policy_rejection()
        );
        assert!(
            HostError::from_message("This document requires 'TrustedHTML' assignment")
                .is_policy_rejection()
        );
        assert_eq!(
            HostError::from_message("stale element reference: element is not attached"),
            HostError::Detached("stale element reference: element is not attached".to_string())
        );
        assert!(
            HostError::from_message("element click intercepted: other element would receive the click")
                .is_transient()
        );
        assert!(matches!(
            HostError::from_message("invalid selector: bad xpath"),
            HostError::InvalidQuery(_)
        ));
        assert!(!HostError::from_message("session deleted").is_transient());
    }

    #[test]
    fn test_query_display() {
        let query = Query::Marker {
            attribute: "data-bid".to_string(),
            reference: ReferenceId(4),
        };
        assert_eq!(query.to_string(), "[data-bid=\"4\"]");
        assert_eq!(Query::DomId("create-btn".to_string()).to_string(), "#create-btn");
    }
}

//! Turns an `ActionRequest` into host primitives and reports how it went.
//!
//! Element actions go through the resolver. Coordinates are used only when resolution
//! found nothing, never when an element was found but refused the action.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::annotate::AnnotationReport;
use crate::config::PilotConfig;
use crate::host::{HostError, PageHost};
use crate::resolver::{Resolution, ResolutionFailure, Resolver};
use crate::types::{
    ActionKind, ActionOutcome, ActionRequest, ElementDescriptor, PageSnapshot, Point,
    METHOD_COORDINATE, METHOD_KEYBOARD, METHOD_TIMER, METHOD_VIEWPORT,
};

/// Primitive applied to a resolved element
#[derive(Debug, Clone, Copy)]
enum ElementOp<'a> {
    Click,
    Fill(&'a str),
    FocusAndType(&'a str),
    Hover,
    ScrollIntoView,
}

/// Primitive applied at a viewport point
#[derive(Debug, Clone, Copy)]
enum PointOp<'a> {
    Click,
    ClickAndType(&'a str),
    Hover,
}

enum Interaction {
    Done(ActionOutcome),
    Unresolved(ResolutionFailure),
}

#[derive(Debug, Clone)]
pub struct ActionExecutor {
    resolver: Resolver,
    retry_bound: u32,
    retry_delay: Duration,
    wait_duration: Duration,
}

impl ActionExecutor {
    pub fn new(config: &PilotConfig) -> Self {
        Self {
            resolver: Resolver::from_config(config),
            retry_bound: config.retry_bound.max(1),
            retry_delay: config.retry_delay,
            wait_duration: config.wait_duration,
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Execute `request` against the page `snapshot` was taken from. Never panics and
    /// never returns an error: every failure ends up in the outcome.
    pub async fn execute<H>(
        &self,
        host: &H,
        request: &ActionRequest,
        snapshot: &PageSnapshot,
    ) -> ActionOutcome
    where
        H: PageHost + ?Sized,
    {
        if let Err(e) = request.validate() {
            return ActionOutcome::failure(None, e.to_string(), 0);
        }

        debug!("Executing {:?}", request);
        let outcome = match request.kind {
            ActionKind::Click => {
                self.targeted(host, request, snapshot, ElementOp::Click, PointOp::Click)
                    .await
            }
            ActionKind::Type => {
                let text = request.text().unwrap_or_default();
                let editable = request
                    .target
                    .and_then(|reference| snapshot.element(reference))
                    .map(|descriptor| descriptor.is_content_editable)
                    .unwrap_or(false);
                let op = if editable {
                    ElementOp::FocusAndType(text)
                } else {
                    ElementOp::Fill(text)
                };
                self.targeted(host, request, snapshot, op, PointOp::ClickAndType(text))
                    .await
            }
            ActionKind::Hover => {
                self.targeted(host, request, snapshot, ElementOp::Hover, PointOp::Hover)
                    .await
            }
            ActionKind::Scroll => self.scroll(host, request, snapshot).await,
            ActionKind::PressKey => {
                let key = request.key().unwrap_or_default();
                self.with_retries(METHOD_KEYBOARD, || host.press_key(key))
                    .await
            }
            ActionKind::Wait => {
                tokio::time::sleep(self.wait_duration).await;
                ActionOutcome::success(METHOD_TIMER, 1)
            }
            // Terminal marker for the loop; nothing to do on the page
            ActionKind::Finish => ActionOutcome::success("finish", 0),
        };

        if outcome.succeeded {
            info!(
                "{} succeeded via {} after {} attempt(s)",
                request.kind,
                outcome.method_used.as_deref().unwrap_or("-"),
                outcome.attempts
            );
        } else {
            warn!(
                "{} failed: {}",
                request.kind,
                outcome.error_detail.as_deref().unwrap_or("unknown error")
            );
        }
        outcome
    }

    /// Element path first, coordinates only if the element could not be resolved
    async fn targeted<H>(
        &self,
        host: &H,
        request: &ActionRequest,
        snapshot: &PageSnapshot,
        element_op: ElementOp<'_>,
        point_op: PointOp<'_>,
    ) -> ActionOutcome
    where
        H: PageHost + ?Sized,
    {
        let mut diagnostics = Vec::new();
        let mut unresolved = None;

        if let Some(reference) = request.target {
            match snapshot.element(reference) {
                Some(descriptor) => {
                    match self
                        .interact(host, descriptor, &snapshot.markers, element_op)
                        .await
                    {
                        Interaction::Done(outcome) => return outcome,
                        Interaction::Unresolved(failure) => {
                            let detail = failure.to_string();
                            diagnostics.push(detail.clone());
                            unresolved = Some(detail);
                        }
                    }
                }
                None => {
                    let detail = format!("reference [{}] is not in the current snapshot", reference);
                    diagnostics.push(detail.clone());
                    unresolved = Some(detail);
                }
            }
        }

        match request.coordinates {
            Some(point) => {
                if unresolved.is_some() {
                    info!("Falling back to coordinates ({}, {})", point.x, point.y);
                }
                self.with_retries(METHOD_COORDINATE, || apply_at(host, point, point_op))
                    .await
                    .with_diagnostics(diagnostics)
            }
            None => {
                let detail = match unresolved {
                    Some(detail) => format!("unresolvable target: {}", detail),
                    None => "unresolvable target".to_string(),
                };
                ActionOutcome::failure(None, detail, 0)
            }
        }
    }

    async fn scroll<H>(&self, host: &H, request: &ActionRequest, snapshot: &PageSnapshot) -> ActionOutcome
    where
        H: PageHost + ?Sized,
    {
        let mut diagnostics = Vec::new();

        if let Some(reference) = request.target {
            match snapshot.element(reference) {
                Some(descriptor) => match self
                    .interact(host, descriptor, &snapshot.markers, ElementOp::ScrollIntoView)
                    .await
                {
                    Interaction::Done(outcome) => return outcome,
                    Interaction::Unresolved(failure) => diagnostics.push(failure.to_string()),
                },
                None => diagnostics.push(format!(
                    "reference [{}] is not in the current snapshot",
                    reference
                )),
            }
        }

        let (direction, amount) = request.scroll();
        let delta = direction.delta(amount);
        self.with_retries(METHOD_VIEWPORT, || host.scroll_by(0, delta))
            .await
            .with_diagnostics(diagnostics)
    }

    /// Resolve and act, re-resolving on every attempt so a replaced element is picked up
    async fn interact<H>(
        &self,
        host: &H,
        descriptor: &ElementDescriptor,
        markers: &AnnotationReport,
        op: ElementOp<'_>,
    ) -> Interaction
    where
        H: PageHost + ?Sized,
    {
        let mut diagnostics = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let resolved = match self.resolver.resolve(host, descriptor, markers).await {
                Resolution::Resolved(resolved) => resolved,
                Resolution::NotFound(failure) => return Interaction::Unresolved(failure),
            };
            if attempt == 1 {
                diagnostics.extend(resolved.diagnostics);
            }
            let method = resolved.strategy.name();

            match apply(host, &resolved.handle, op).await {
                Ok(()) => {
                    return Interaction::Done(
                        ActionOutcome::success(method, attempt).with_diagnostics(diagnostics),
                    );
                }
                Err(e) if e.is_transient() && attempt < self.retry_bound => {
                    warn!(
                        "Attempt {}/{} on [{}] hit a transient error, retrying: {}",
                        attempt, self.retry_bound, descriptor.reference_id, e
                    );
                    diagnostics.push(format!("attempt {}: {}", attempt, e));
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    return Interaction::Done(
                        ActionOutcome::failure(Some(method.to_string()), e.to_string(), attempt)
                            .with_diagnostics(diagnostics),
                    );
                }
            }
        }
    }

    async fn with_retries<F, Fut>(&self, method: &str, mut operation: F) -> ActionOutcome
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<(), HostError>>,
    {
        let mut diagnostics = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(()) => {
                    return ActionOutcome::success(method, attempt).with_diagnostics(diagnostics);
                }
                Err(e) if e.is_transient() && attempt < self.retry_bound => {
                    warn!("{} attempt {} failed, retrying: {}", method, attempt, e);
                    diagnostics.push(format!("attempt {}: {}", attempt, e));
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    return ActionOutcome::failure(Some(method.to_string()), e.to_string(), attempt)
                        .with_diagnostics(diagnostics);
                }
            }
        }
    }
}

async fn apply<H>(host: &H, element: &H::Element, op: ElementOp<'_>) -> Result<(), HostError>
where
    H: PageHost + ?Sized,
{
    match op {
        ElementOp::Click => host.click(element).await,
        ElementOp::Fill(text) => host.fill(element, text).await,
        ElementOp::FocusAndType(text) => {
            host.focus(element).await?;
            // Keystrokes already sent cannot be taken back, so a retry would duplicate them
            host.type_keys(text)
                .await
                .map_err(|e| HostError::Other(format!("keystroke entry interrupted: {}", e)))
        }
        ElementOp::Hover => host.hover(element).await,
        ElementOp::ScrollIntoView => host.scroll_into_view(element).await,
    }
}

async fn apply_at<H>(host: &H, point: Point, op: PointOp<'_>) -> Result<(), HostError>
where
    H: PageHost + ?Sized,
{
    match op {
        PointOp::Click => host.click_at(point).await,
        PointOp::ClickAndType(text) => {
            host.click_at(point).await?;
            host.type_keys(text)
                .await
                .map_err(|e| HostError::Other(format!("keystroke entry interrupted: {}", e)))
        }
        PointOp::Hover => host.hover_at(point).await,
    }
}

//! The turn-based loop: snapshot, ask, execute, record, until a terminal status.
//!
//! ```text
//! INIT -> STEPPING -> { COMPLETED | FAILED | STEP_BUDGET_EXCEEDED }
//! ```
//!
//! Termination checks run in a fixed order after every executed step:
//! loop guard first, then the step budget.

use chrono::Utc;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::PilotConfig;
use crate::executor::ActionExecutor;
use crate::host::PageHost;
use crate::oracle::{DecisionOracle, OracleError};
use crate::prompt;
use crate::session::TaskSession;
use crate::snapshot::SnapshotBuilder;
use crate::types::{ActionKind, ActionOutcome, SessionStatus, SnapshotSummary, StepRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
enum LoopState {
    Stepping,
    Terminal(SessionStatus, Option<String>),
}

/// Drives one task against a host with an oracle
pub struct Orchestrator<H, O> {
    host: H,
    oracle: O,
    config: PilotConfig,
    snapshots: SnapshotBuilder,
    executor: ActionExecutor,
}

impl<H, O> Orchestrator<H, O>
where
    H: PageHost,
    O: DecisionOracle,
{
    pub fn new(host: H, oracle: O, config: PilotConfig) -> Self {
        Self {
            snapshots: SnapshotBuilder::new(&config),
            executor: ActionExecutor::new(&config),
            host,
            oracle,
            config,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn config(&self) -> &PilotConfig {
        &self.config
    }

    /// Give the host back, e.g. to close the browser
    pub fn into_host(self) -> H {
        self.host
    }

    /// Run `task` starting at `start_url`. Always returns a finished session.
    pub async fn run(&self, task: &str, start_url: &str) -> TaskSession {
        let mut session = TaskSession::new(task, start_url);
        let started = Instant::now();
        info!("Session {} started: {}", session.id, task);

        let mut state = self.init(start_url).await;
        while state == LoopState::Stepping {
            state = self.step(&mut session, started).await;
        }

        if let LoopState::Terminal(status, reason) = state {
            match &reason {
                Some(reason) => warn!("Session {} ended {}: {}", session.id, status, reason),
                None => info!("Session {} ended {}", session.id, status),
            }
            if let Err(e) = session.finish(status, reason) {
                error!("Could not finish session: {}", e);
            }
        }
        session
    }

    async fn init(&self, start_url: &str) -> LoopState {
        if let Err(e) = self.host.navigate(start_url).await {
            return LoopState::Terminal(
                SessionStatus::Failed,
                Some(format!("could not open {}: {}", start_url, e)),
            );
        }
        if self.config.step_budget == 0 {
            return LoopState::Terminal(SessionStatus::StepBudgetExceeded, None);
        }
        LoopState::Stepping
    }

    async fn step(&self, session: &mut TaskSession, started: Instant) -> LoopState {
        if let Some(deadline) = self.config.task_deadline
            && started.elapsed() >= deadline
        {
            return LoopState::Terminal(
                SessionStatus::Failed,
                Some(format!("deadline of {}ms exceeded", deadline.as_millis())),
            );
        }

        let index = session.next_index();
        let snapshot = match self.snapshots.capture(&self.host, index).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let (url, title) = match session.steps().last() {
                    Some(last) => (last.url_after.clone(), last.title_after.clone()),
                    None => (session.start_url.clone(), String::new()),
                };
                let record = StepRecord {
                    index,
                    snapshot: SnapshotSummary {
                        url: url.clone(),
                        title: title.clone(),
                        screenshot: None,
                        element_count: 0,
                        markers_injected: 0,
                    },
                    action: None,
                    outcome: Some(ActionOutcome::failure(None, e.to_string(), 0)),
                    url_after: url,
                    title_after: title,
                    recorded_at: Utc::now(),
                };
                return self.record_or_fail(
                    session,
                    record,
                    LoopState::Terminal(
                        SessionStatus::Failed,
                        Some(format!("could not capture page: {}", e)),
                    ),
                );
            }
        };

        let decision = match tokio::time::timeout(
            self.config.oracle_timeout,
            self.oracle.decide(&session.task, &snapshot, session.steps()),
        )
        .await
        {
            Ok(decision) => decision,
            Err(_) => Err(OracleError::Timeout(self.config.oracle_timeout)),
        };

        let action = match decision {
            Ok(action) => action,
            Err(e) => {
                let reason = if e.is_contract_violation() {
                    format!("oracle contract violation: {}", e)
                } else {
                    format!("oracle unavailable: {}", e)
                };
                let record = StepRecord {
                    index,
                    snapshot: snapshot.summary(),
                    action: None,
                    outcome: Some(ActionOutcome::failure(None, e.to_string(), 0)),
                    url_after: snapshot.url.clone(),
                    title_after: snapshot.title.clone(),
                    recorded_at: Utc::now(),
                };
                return self.record_or_fail(
                    session,
                    record,
                    LoopState::Terminal(SessionStatus::Failed, Some(reason)),
                );
            }
        };

        info!("Step {}: {}", index, prompt::describe_action(&action));

        if action.kind == ActionKind::Finish {
            let record = StepRecord {
                index,
                snapshot: snapshot.summary(),
                action: Some(action),
                outcome: None,
                url_after: snapshot.url.clone(),
                title_after: snapshot.title.clone(),
                recorded_at: Utc::now(),
            };
            return self.record_or_fail(
                session,
                record,
                LoopState::Terminal(SessionStatus::Completed, None),
            );
        }

        let outcome = self.executor.execute(&self.host, &action, &snapshot).await;
        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let url_after = self
            .host
            .current_url()
            .await
            .unwrap_or_else(|_| snapshot.url.clone());
        let title_after = self
            .host
            .title()
            .await
            .unwrap_or_else(|_| snapshot.title.clone());

        let record = StepRecord {
            index,
            snapshot: snapshot.summary(),
            action: Some(action),
            outcome: Some(outcome),
            url_after,
            title_after,
            recorded_at: Utc::now(),
        };
        if let LoopState::Terminal(status, reason) =
            self.record_or_fail(session, record, LoopState::Stepping)
        {
            return LoopState::Terminal(status, reason);
        }

        let repeated = session.trailing_identical_failures();
        if repeated >= self.config.loop_guard_window {
            let last = session
                .steps()
                .last()
                .map(prompt::describe_step)
                .unwrap_or_default();
            return LoopState::Terminal(
                SessionStatus::Failed,
                Some(format!(
                    "loop guard: {} identical failures in a row ({})",
                    repeated, last
                )),
            );
        }

        if session.executed_steps() >= self.config.step_budget {
            return LoopState::Terminal(SessionStatus::StepBudgetExceeded, None);
        }

        LoopState::Stepping
    }

    fn record_or_fail(
        &self,
        session: &mut TaskSession,
        record: StepRecord,
        next: LoopState,
    ) -> LoopState {
        match session.record(record) {
            Ok(()) => next,
            Err(e) => LoopState::Terminal(SessionStatus::Failed, Some(e.to_string())),
        }
    }
}

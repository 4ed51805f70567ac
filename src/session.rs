//! Task sessions: the append-only step log for one task, and where it is persisted.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::prompt;
use crate::types::{SessionStatus, StepRecord};

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("session {id} already finished with status {status}")]
    AlreadyFinished { id: Uuid, status: SessionStatus },
    #[error("{0} is not a terminal status")]
    NotTerminal(SessionStatus),
    #[error("step {got} recorded out of order, expected {expected}")]
    OutOfOrder { expected: u32, got: u32 },
}

/// One task from start to terminal status.
///
/// Steps are append-only and the terminal status is set exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSession {
    pub id: Uuid,
    pub task: String,
    pub start_url: String,
    status: SessionStatus,
    failure_reason: Option<String>,
    steps: Vec<StepRecord>,
    pub started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl TaskSession {
    pub fn new(task: impl Into<String>, start_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            start_url: start_url.into(),
            status: SessionStatus::Running,
            failure_reason: None,
            steps: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Ordinal the next recorded step must carry
    pub fn next_index(&self) -> u32 {
        self.steps.len() as u32 + 1
    }

    /// Steps whose action actually ran against the page
    pub fn executed_steps(&self) -> u32 {
        self.steps
            .iter()
            .filter(|step| step.action.is_some() && step.outcome.is_some())
            .count() as u32
    }

    pub(crate) fn record(&mut self, step: StepRecord) -> Result<(), SessionError> {
        if self.status.is_terminal() {
            return Err(SessionError::AlreadyFinished {
                id: self.id,
                status: self.status,
            });
        }
        if step.index != self.next_index() {
            return Err(SessionError::OutOfOrder {
                expected: self.next_index(),
                got: step.index,
            });
        }
        self.steps.push(step);
        Ok(())
    }

    pub(crate) fn finish(
        &mut self,
        status: SessionStatus,
        reason: Option<String>,
    ) -> Result<(), SessionError> {
        if !status.is_terminal() {
            return Err(SessionError::NotTerminal(status));
        }
        if self.status.is_terminal() {
            return Err(SessionError::AlreadyFinished {
                id: self.id,
                status: self.status,
            });
        }
        self.status = status;
        self.failure_reason = reason;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Length of the run of identical failures at the end of the log
    pub fn trailing_identical_failures(&self) -> usize {
        let mut keys = self.steps.iter().rev().map(StepRecord::failure_key);
        let Some(Some(last)) = keys.next() else {
            return 0;
        };
        1 + keys.take_while(|key| key.as_ref() == Some(&last)).count()
    }

    /// Human-readable step log
    pub fn render_transcript(&self) -> String {
        let mut lines = vec![
            format!("Session {}", self.id),
            format!("Task: {}", self.task),
            format!("Start URL: {}", self.start_url),
            format!("Status: {}", self.status),
        ];
        if let Some(reason) = &self.failure_reason {
            lines.push(format!("Reason: {}", reason));
        }
        lines.push(format!("Started: {}", self.started_at.to_rfc3339()));
        if let Some(finished) = self.finished_at {
            let elapsed = finished - self.started_at;
            lines.push(format!(
                "Finished: {} ({:.1}s)",
                finished.to_rfc3339(),
                elapsed.num_milliseconds() as f64 / 1000.0
            ));
        }

        lines.push(String::new());
        if self.steps.is_empty() {
            lines.push("No steps recorded.".to_string());
        }
        for step in &self.steps {
            lines.push(prompt::describe_step(step));
            lines.push(format!("    on: {} ({})", step.snapshot.url, step.snapshot.title));
            if let Some(reasoning) = step.action.as_ref().and_then(|a| a.reasoning.as_deref()) {
                lines.push(format!("    why: {}", reasoning));
            }
            if let Some(outcome) = &step.outcome {
                for diagnostic in &outcome.diagnostics {
                    lines.push(format!("    note: {}", diagnostic));
                }
            }
        }

        lines.join("\n")
    }
}

/// Directory of saved sessions, one JSON file per session
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.webpilot/sessions`
    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(Self::new(home.join(".webpilot").join("sessions")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    pub fn save(&self, session: &TaskSession) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create session directory {}", self.dir.display())
        })?;

        let path = self.path_for(session.id);
        let json = serde_json::to_string_pretty(session)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write session {}", path.display()))?;

        info!("Saved session {} to {}", session.id, path.display());
        Ok(path)
    }

    pub fn load(&self, id: Uuid) -> Result<TaskSession> {
        Self::load_file(&self.path_for(id))
    }

    pub fn load_file(path: &Path) -> Result<TaskSession> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read session {}", path.display()))?;
        let session = serde_json::from_str(&json)
            .with_context(|| format!("Session file {} is not valid", path.display()))?;
        debug!("Loaded session from {}", path.display());
        Ok(session)
    }

    /// Saved sessions, most recent first
    pub fn list(&self) -> Result<Vec<TaskSession>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            sessions.push(Self::load_file(&path)?);
        }
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

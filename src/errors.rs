use std::fmt;

use crate::config::ConfigError;
use crate::types::SessionStatus;

/// Top-level error type that carries a process exit code
#[derive(Debug)]
pub enum PilotError {
    /// Bad arguments or configuration (exit code 2)
    InvalidInput(String),
    /// WebDriver unreachable or session could not be created (exit code 3)
    WebDriverFailed(String),
    /// Decision oracle could not be set up or reached (exit code 4)
    OracleFailed(String),
    /// The task ran but did not complete (exit code 5)
    TaskIncomplete {
        status: SessionStatus,
        reason: Option<String>,
    },
    /// Generic error (exit code 1)
    Other(anyhow::Error),
}

impl PilotError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PilotError::InvalidInput(_) => 2,
            PilotError::WebDriverFailed(_) => 3,
            PilotError::OracleFailed(_) => 4,
            PilotError::TaskIncomplete { .. } => 5,
            PilotError::Other(_) => 1,
        }
    }
}

impl fmt::Display for PilotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PilotError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            PilotError::WebDriverFailed(msg) => write!(f, "WebDriver connection failed: {}", msg),
            PilotError::OracleFailed(msg) => write!(f, "Decision oracle failed: {}", msg),
            PilotError::TaskIncomplete { status, reason } => match reason {
                Some(reason) => write!(f, "Task ended with status {}: {}", status, reason),
                None => write!(f, "Task ended with status {}", status),
            },
            PilotError::Other(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for PilotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PilotError::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<ConfigError> for PilotError {
    fn from(err: ConfigError) -> Self {
        PilotError::InvalidInput(err.to_string())
    }
}

impl From<anyhow::Error> for PilotError {
    fn from(err: anyhow::Error) -> Self {
        // Typed errors survive the trip through anyhow
        let err = match err.downcast::<PilotError>() {
            Ok(pilot) => return pilot,
            Err(err) => err,
        };
        if let Some(config) = err.downcast_ref::<ConfigError>() {
            return PilotError::InvalidInput(config.to_string());
        }

        let msg = err.to_string();
        if msg.contains("Failed to connect to WebDriver")
            || msg.contains("WebDriver")
            || msg.contains("geckodriver")
            || msg.contains("chromedriver")
        {
            PilotError::WebDriverFailed(msg)
        } else if msg.contains("oracle endpoint") {
            PilotError::OracleFailed(msg)
        } else if msg.contains("Invalid viewport")
            || msg.contains("Invalid width")
            || msg.contains("Invalid height")
            || msg.contains("Unsupported browser")
            || msg.contains("Invalid reference id")
        {
            PilotError::InvalidInput(msg)
        } else {
            PilotError::Other(err)
        }
    }
}

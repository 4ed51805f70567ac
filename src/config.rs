//! Configuration surface for perception, resolution, execution and the loop.
//!
//! Every bound and timeout used by the core lives here. Defaults:
//!
//! | Setting | Default | Env override |
//! |---|---|---|
//! | `step_budget` | 20 | `WEBPILOT_MAX_STEPS` |
//! | `max_elements` | 100 | `WEBPILOT_MAX_ELEMENTS` |
//! | `max_page_text_chars` | 3000 | `WEBPILOT_MAX_PAGE_TEXT` |
//! | `strategy_timeouts.marker` | 500 ms | `WEBPILOT_MARKER_TIMEOUT_MS` |
//! | `strategy_timeouts.semantic` | 1500 ms | `WEBPILOT_SEMANTIC_TIMEOUT_MS` |
//! | `strategy_timeouts.attribute` | 1000 ms | `WEBPILOT_ATTRIBUTE_TIMEOUT_MS` |
//! | `strategy_timeouts.text` | 1500 ms | `WEBPILOT_TEXT_TIMEOUT_MS` |
//! | `wait_duration` | 1000 ms | `WEBPILOT_WAIT_MS` |
//! | `retry_bound` | 3 | `WEBPILOT_RETRY_BOUND` |
//! | `retry_delay` | 250 ms | `WEBPILOT_RETRY_DELAY_MS` |
//! | `settle_delay` | 1500 ms | `WEBPILOT_SETTLE_MS` |
//! | `loop_guard_window` | 3 | `WEBPILOT_LOOP_GUARD` |
//! | `oracle_timeout` | 60 s | `WEBPILOT_ORACLE_TIMEOUT_MS` |
//! | `task_deadline` | none | `WEBPILOT_DEADLINE_MS` |
//! | `artifact_dir` | none | `WEBPILOT_ARTIFACT_DIR` |

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a non-negative integer, got '{value}'")]
    InvalidNumber { name: String, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Bounded wait for each resolution strategy family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyTimeouts {
    /// Direct marker lookup
    #[serde(with = "millis")]
    pub marker: Duration,
    /// Role+label and label lookups
    #[serde(with = "millis")]
    pub semantic: Duration,
    /// Placeholder, name and id lookups
    #[serde(with = "millis")]
    pub attribute: Duration,
    /// Visible-text containment
    #[serde(with = "millis")]
    pub text: Duration,
}

impl Default for StrategyTimeouts {
    fn default() -> Self {
        Self {
            marker: Duration::from_millis(500),
            semantic: Duration::from_millis(1500),
            attribute: Duration::from_millis(1000),
            text: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PilotConfig {
    /// Maximum executed steps before STEP_BUDGET_EXCEEDED
    pub step_budget: u32,
    /// Catalog cap, truncated by discovery order
    pub max_elements: usize,
    pub max_page_text_chars: usize,
    pub strategy_timeouts: StrategyTimeouts,
    /// Fixed sleep for WAIT actions
    #[serde(with = "millis")]
    pub wait_duration: Duration,
    /// Attempts per primitive action on transient errors
    pub retry_bound: u32,
    #[serde(with = "millis")]
    pub retry_delay: Duration,
    /// Pause after each executed action before the next snapshot
    #[serde(with = "millis")]
    pub settle_delay: Duration,
    /// Identical consecutive failures that abort the session
    pub loop_guard_window: usize,
    #[serde(with = "millis")]
    pub oracle_timeout: Duration,
    /// Wall-clock limit for the whole task, checked between steps
    #[serde(default, with = "opt_millis")]
    pub task_deadline: Option<Duration>,
    /// Where screenshots are written; none keeps no artifacts
    pub artifact_dir: Option<PathBuf>,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            step_budget: 20,
            max_elements: 100,
            max_page_text_chars: 3000,
            strategy_timeouts: StrategyTimeouts::default(),
            wait_duration: Duration::from_millis(1000),
            retry_bound: 3,
            retry_delay: Duration::from_millis(250),
            settle_delay: Duration::from_millis(1500),
            loop_guard_window: 3,
            oracle_timeout: Duration::from_secs(60),
            task_deadline: None,
            artifact_dir: None,
        }
    }
}

/// Fit a parsed count into the field's type instead of wrapping
fn narrow<T: TryFrom<u64>>(key: &str, value: Option<u64>) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| {
            T::try_from(v).map_err(|_| ConfigError::InvalidNumber {
                name: key.to_string(),
                value: v.to_string(),
            })
        })
        .transpose()
}

impl PilotConfig {
    /// Defaults overridden by `WEBPILOT_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let number = |key: &str| -> Result<Option<u64>, ConfigError> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| ConfigError::InvalidNumber {
                        name: key.to_string(),
                        value: raw,
                    }),
                None => Ok(None),
            }
        };

        if let Some(v) = narrow::<u32>("WEBPILOT_MAX_STEPS", number("WEBPILOT_MAX_STEPS")?)? {
            config.step_budget = v;
        }
        if let Some(v) = narrow::<usize>("WEBPILOT_MAX_ELEMENTS", number("WEBPILOT_MAX_ELEMENTS")?)? {
            config.max_elements = v;
        }
        if let Some(v) = narrow::<usize>("WEBPILOT_MAX_PAGE_TEXT", number("WEBPILOT_MAX_PAGE_TEXT")?)? {
            config.max_page_text_chars = v;
        }
        if let Some(v) = number("WEBPILOT_MARKER_TIMEOUT_MS")? {
            config.strategy_timeouts.marker = Duration::from_millis(v);
        }
        if let Some(v) = number("WEBPILOT_SEMANTIC_TIMEOUT_MS")? {
            config.strategy_timeouts.semantic = Duration::from_millis(v);
        }
        if let Some(v) = number("WEBPILOT_ATTRIBUTE_TIMEOUT_MS")? {
            config.strategy_timeouts.attribute = Duration::from_millis(v);
        }
        if let Some(v) = number("WEBPILOT_TEXT_TIMEOUT_MS")? {
            config.strategy_timeouts.text = Duration::from_millis(v);
        }
        if let Some(v) = number("WEBPILOT_WAIT_MS")? {
            config.wait_duration = Duration::from_millis(v);
        }
        if let Some(v) = narrow::<u32>("WEBPILOT_RETRY_BOUND", number("WEBPILOT_RETRY_BOUND")?)? {
            config.retry_bound = v;
        }
        if let Some(v) = number("WEBPILOT_RETRY_DELAY_MS")? {
            config.retry_delay = Duration::from_millis(v);
        }
        if let Some(v) = number("WEBPILOT_SETTLE_MS")? {
            config.settle_delay = Duration::from_millis(v);
        }
        if let Some(v) = narrow::<usize>("WEBPILOT_LOOP_GUARD", number("WEBPILOT_LOOP_GUARD")?)? {
            config.loop_guard_window = v;
        }
        if let Some(v) = number("WEBPILOT_ORACLE_TIMEOUT_MS")? {
            config.oracle_timeout = Duration::from_millis(v);
        }
        if let Some(v) = number("WEBPILOT_DEADLINE_MS")? {
            config.task_deadline = Some(Duration::from_millis(v));
        }
        if let Some(dir) = lookup("WEBPILOT_ARTIFACT_DIR") {
            config.artifact_dir = Some(PathBuf::from(dir));
        }

        config.validate()?;
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Reject settings that would make the loop or executor meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_elements == 0 {
            return Err(ConfigError::Zero("max_elements"));
        }
        if self.retry_bound == 0 {
            return Err(ConfigError::Zero("retry_bound"));
        }
        if self.loop_guard_window == 0 {
            return Err(ConfigError::Zero("loop_guard_window"));
        }
        Ok(())
    }

    /// Settings suited to tests and in-memory hosts: no sleeps, short waits
    pub fn immediate() -> Self {
        Self {
            strategy_timeouts: StrategyTimeouts {
                marker: Duration::from_millis(20),
                semantic: Duration::from_millis(20),
                attribute: Duration::from_millis(20),
                text: Duration::from_millis(20),
            },
            wait_duration: Duration::ZERO,
            retry_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
            oracle_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

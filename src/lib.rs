//! # webpilot
#![allow(clippy::uninlined_format_args)]
//!
//! Turn-based web automation: an oracle picks one action per step, and a hybrid
//! element resolver carries it out on a live WebDriver page.
//!
//! Each step:
//!
//! 1. builds a [`PageSnapshot`]: a catalog of interactive elements with per-snapshot
//!    reference ids ("bids"), the visible page text, and an optional screenshot;
//! 2. writes `data-bid` markers on the live page when the page allows it;
//! 3. asks a [`DecisionOracle`] for one [`ActionRequest`];
//! 4. resolves the target through a fixed strategy chain (marker, role+label,
//!    label, placeholder, name, id, text) and falls back to coordinates only
//!    when nothing resolves;
//! 5. records a [`StepRecord`] and checks the loop guard and step budget.
//!
//! ## CLI Usage
//!
//! ```bash
//! # Run a task against a decision service
//! webpilot run "Create a new issue titled 'Flaky test'" https://tracker.example.com \
//!     --oracle http://localhost:8000/decide
//!
//! # Show what the oracle would see on a page
//! webpilot catalog https://example.com --format simple
//!
//! # Inspect saved sessions
//! webpilot session list
//! webpilot session show 5f0c...-...
//! ```
//!
//! Logs go to stderr and honour `RUST_LOG` (default `webpilot=info`). Tuning knobs are
//! read from `WEBPILOT_*` environment variables, see [`config`].
//!
//! ## Library Usage
//!
//! ```no_run
//! use webpilot::{Browser, BrowserOptions, BrowserType, HttpOracle, Orchestrator, PilotConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PilotConfig::from_env()?;
//! let browser = Browser::connect(BrowserOptions {
//!     browser_type: BrowserType::Firefox,
//!     webdriver_url: None,
//!     viewport: None,
//!     headless: true,
//! })
//! .await?;
//! let oracle = HttpOracle::new("http://localhost:8000/decide", config.oracle_timeout)?;
//!
//! let session = Orchestrator::new(browser, oracle, config)
//!     .run("Find the pricing page", "https://example.com")
//!     .await;
//! println!("{}", session.render_transcript());
//! # Ok(())
//! # }
//! ```

/// Marker injection on the live page
pub mod annotate;

/// Element catalog extraction from markup
pub mod catalog;

/// CLI command handlers
pub mod commands;

pub mod config;

/// Exit-code carrying error type for the CLI
pub mod errors;

/// Action execution with retries and coordinate fallback
pub mod executor;

/// Browser host abstraction
pub mod host;

/// Decision oracle trait, HTTP client and reply parser
pub mod oracle;

pub mod orchestrator;

pub mod prompt;

/// Hybrid element resolution
pub mod resolver;

/// Session log and persistence
pub mod session;

pub mod snapshot;

/// Core data model
pub mod types;

/// WebDriver browser control
pub mod webdriver;

pub use annotate::{AnnotationReport, MarkerState, SkipReason, MARKER_ATTRIBUTE};
pub use catalog::{Catalog, CatalogBuilder};
pub use config::{ConfigError, PilotConfig, StrategyTimeouts};
pub use errors::PilotError;
pub use executor::ActionExecutor;
pub use host::{FoundElement, HostError, PageHost, Query};
pub use oracle::{parse_action, ActionParseError, DecisionOracle, HttpOracle, OracleError};
pub use orchestrator::Orchestrator;
pub use resolver::{Resolution, ResolutionFailure, ResolutionStrategy, Resolver};
pub use session::{SessionError, SessionStore, TaskSession};
pub use snapshot::SnapshotBuilder;
pub use types::{
    ActionKind, ActionOutcome, ActionPayload, ActionRequest, ElementDescriptor, OutputFormat,
    PageSnapshot, Point, ReferenceId, ScrollDirection, SessionStatus, StepRecord, ViewportSize,
};
pub use webdriver::{Browser, BrowserOptions, BrowserType};

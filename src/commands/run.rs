use anyhow::Result;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::PilotConfig;
use crate::errors::PilotError;
use crate::oracle::HttpOracle;
use crate::orchestrator::Orchestrator;
use crate::session::SessionStore;
use crate::types::{OutputFormat, SessionStatus};

use super::utils::{print_json, BrowserArgs};

pub struct RunArgs {
    pub task: String,
    pub url: String,
    pub oracle: String,
    pub browser: BrowserArgs,
    pub max_steps: Option<u32>,
    pub artifact_dir: Option<PathBuf>,
    pub format: OutputFormat,
    pub no_save: bool,
}

pub async fn handle_run(args: RunArgs) -> Result<()> {
    let mut config = PilotConfig::from_env()?;
    if let Some(max_steps) = args.max_steps {
        config.step_budget = max_steps;
    }
    if args.artifact_dir.is_some() {
        config.artifact_dir = args.artifact_dir;
    }
    config.validate()?;

    let oracle = HttpOracle::new(&args.oracle, config.oracle_timeout)
        .map_err(|e| PilotError::OracleFailed(e.to_string()))?;
    let browser = args.browser.connect().await?;

    info!("Running task '{}' from {}", args.task, args.url);
    let orchestrator = Orchestrator::new(browser, oracle, config);
    let session = orchestrator.run(&args.task, &args.url).await;

    if let Err(e) = orchestrator.into_host().close().await {
        warn!("Failed to close browser: {}", e);
    }

    if !args.no_save {
        let store = SessionStore::default_location()?;
        let path = store.save(&session)?;
        eprintln!("Session saved to {}", path.display());
    }

    match args.format {
        OutputFormat::Json => print_json(&session)?,
        OutputFormat::Simple => println!("{}", session.render_transcript()),
    }

    if session.status() != SessionStatus::Completed {
        return Err(PilotError::TaskIncomplete {
            status: session.status(),
            reason: session.failure_reason().map(str::to_string),
        }
        .into());
    }
    Ok(())
}

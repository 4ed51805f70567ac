#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webpilot::commands;
use webpilot::commands::run::RunArgs;
use webpilot::commands::session::SessionCommands;
use webpilot::commands::utils::BrowserArgs;
use webpilot::errors::PilotError;
use webpilot::types::OutputFormat;

const EXIT_SUCCESS: i32 = 0;

#[derive(Parser)]
#[command(name = "webpilot")]
#[command(about = "Turn-based web automation driven by a decision oracle", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task until the oracle finishes it or a limit is hit
    Run {
        /// Natural-language task description
        task: String,

        /// Starting URL
        url: String,

        /// Decision oracle endpoint
        #[arg(long, env = "WEBPILOT_ORACLE_URL")]
        oracle: String,

        #[command(flatten)]
        browser: BrowserArgs,

        /// Step budget (overrides WEBPILOT_MAX_STEPS)
        #[arg(long)]
        max_steps: Option<u32>,

        /// Directory for per-step screenshots
        #[arg(long)]
        artifact_dir: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "simple")]
        format: OutputFormat,

        /// Do not save the session under ~/.webpilot/sessions
        #[arg(long)]
        no_save: bool,
    },

    /// Print the element catalog and page text for a URL
    Catalog {
        /// URL to catalog
        url: String,

        #[command(flatten)]
        browser: BrowserArgs,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },

    /// Inspect saved sessions
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[tokio::main]
async fn main() {
    let result = run().await;

    match result {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(err) => {
            let pilot_err: PilotError = err.into();

            // Output JSON error to stdout for programmatic consumption
            let error_json = json!({
                "error": true,
                "message": pilot_err.to_string(),
                "exit_code": pilot_err.exit_code()
            });
            println!(
                "{}",
                serde_json::to_string(&error_json).unwrap_or_else(|_| "{}".to_string())
            );

            eprintln!("Error: {}", pilot_err);
            std::process::exit(pilot_err.exit_code());
        }
    }
}

async fn run() -> Result<()> {
    // Logs go to stderr so stdout stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webpilot=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            task,
            url,
            oracle,
            browser,
            max_steps,
            artifact_dir,
            format,
            no_save,
        } => {
            commands::run::handle_run(RunArgs {
                task,
                url,
                oracle,
                browser,
                max_steps,
                artifact_dir,
                format,
                no_save,
            })
            .await?
        }

        Commands::Catalog {
            url,
            browser,
            format,
        } => commands::catalog::handle_catalog(url, browser, format).await?,

        Commands::Session { command } => commands::session::handle_session(command).await?,
    }

    Ok(())
}

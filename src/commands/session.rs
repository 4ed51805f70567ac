use anyhow::Result;
use clap::Subcommand;
use uuid::Uuid;

use crate::session::SessionStore;
use crate::types::OutputFormat;

use super::utils::print_json;

#[derive(Subcommand)]
pub enum SessionCommands {
    /// List saved sessions, most recent first
    List,

    /// Show a saved session
    Show {
        /// Session id
        id: Uuid,

        /// Output format
        #[arg(short, long, default_value = "simple")]
        format: OutputFormat,
    },
}

pub async fn handle_session(command: SessionCommands) -> Result<()> {
    let store = SessionStore::default_location()?;

    match command {
        SessionCommands::List => {
            let sessions = store.list()?;
            if sessions.is_empty() {
                println!("No sessions found");
                return Ok(());
            }

            println!("Saved sessions:");
            for session in sessions {
                println!(
                    "  {} {} ({} steps) - {} - started {}",
                    session.id,
                    session.status(),
                    session.steps().len(),
                    session.task,
                    session.started_at.to_rfc3339()
                );
            }
        }
        SessionCommands::Show { id, format } => {
            let session = store.load(id)?;
            match format {
                OutputFormat::Json => print_json(&session)?,
                OutputFormat::Simple => println!("{}", session.render_transcript()),
            }
        }
    }
    Ok(())
}

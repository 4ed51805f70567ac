use anyhow::Result;
use serde_json::json;
use tracing::{info, warn};

use crate::config::PilotConfig;
use crate::host::PageHost;
use crate::prompt;
use crate::snapshot::SnapshotBuilder;
use crate::types::OutputFormat;

use super::utils::{print_json, BrowserArgs};

/// Open `url`, build one snapshot and print what the oracle would see
pub async fn handle_catalog(url: String, browser: BrowserArgs, format: OutputFormat) -> Result<()> {
    let config = PilotConfig::from_env()?;
    let browser = browser.connect().await?;

    let result = async {
        browser.navigate(&url).await?;
        let snapshot = SnapshotBuilder::new(&config).capture(&browser, 1).await?;
        info!(
            "Catalogued {} elements on {}",
            snapshot.elements.len(),
            snapshot.url
        );
        Ok::<_, anyhow::Error>(snapshot)
    }
    .await;

    if let Err(e) = browser.close().await {
        warn!("Failed to close browser: {}", e);
    }
    let snapshot = result?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "url": snapshot.url,
            "title": snapshot.title,
            "elements": snapshot.elements,
            "markers_injected": snapshot.markers.injected_count(),
            "page_text": snapshot.page_text,
        }))?,
        OutputFormat::Simple => {
            println!("{} ({})", snapshot.title, snapshot.url);
            println!();
            println!("{}", prompt::render_elements(&snapshot, config.max_elements));
            println!();
            println!(
                "{}",
                prompt::render_page_text(&snapshot, config.max_page_text_chars)
            );
        }
    }
    Ok(())
}

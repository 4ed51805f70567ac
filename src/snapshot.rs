//! Builds a `PageSnapshot`: catalog, page text, markers and an optional screenshot.

use std::path::PathBuf;
use tracing::{debug, warn};

use crate::annotate;
use crate::catalog::CatalogBuilder;
use crate::config::PilotConfig;
use crate::host::{HostError, PageHost};
use crate::types::PageSnapshot;

#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    catalog: CatalogBuilder,
    artifact_dir: Option<PathBuf>,
}

impl SnapshotBuilder {
    pub fn new(config: &PilotConfig) -> Self {
        Self {
            catalog: CatalogBuilder::from_config(config),
            artifact_dir: config.artifact_dir.clone(),
        }
    }

    /// Capture the page as it is now. Only failing to read the document is fatal;
    /// markers and screenshots degrade quietly.
    pub async fn capture<H>(&self, host: &H, sequence: u32) -> Result<PageSnapshot, HostError>
    where
        H: PageHost + ?Sized,
    {
        let markup = host.page_source().await?;
        let url = host.current_url().await?;
        let title = host.title().await.unwrap_or_else(|e| {
            warn!("Could not read page title: {}", e);
            String::new()
        });

        let (catalog, page_text) = self.catalog.extract(&markup);
        let markers = annotate::annotate(host, &catalog.elements).await;
        let screenshot = self.store_screenshot(host, sequence).await;

        debug!(
            "Snapshot {} of {}: {} elements, {} markers",
            sequence,
            url,
            catalog.elements.len(),
            markers.injected_count()
        );

        Ok(PageSnapshot {
            elements: catalog.elements,
            page_text,
            screenshot,
            url,
            title,
            markers,
        })
    }

    async fn store_screenshot<H>(&self, host: &H, sequence: u32) -> Option<PathBuf>
    where
        H: PageHost + ?Sized,
    {
        let dir = self.artifact_dir.as_ref()?;

        let bytes = match host.screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Screenshot failed, continuing without it: {}", e);
                return None;
            }
        };

        let path = dir.join(format!("step_{}.png", sequence));
        let written = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, &bytes).await
        }
        .await;

        match written {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("Could not store screenshot at {}: {}", path.display(), e);
                None
            }
        }
    }
}

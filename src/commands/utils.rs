use anyhow::Result;
use serde::Serialize;

use crate::types::ViewportSize;
use crate::webdriver::{Browser, BrowserOptions, BrowserType};

/// Browser flags shared by every command that opens a page
#[derive(Debug, Clone, clap::Args)]
pub struct BrowserArgs {
    /// Browser to use (firefox, chrome)
    #[arg(short, long, default_value = "firefox")]
    pub browser: String,

    /// WebDriver URL (defaults to localhost:4444 for Firefox, localhost:9515 for Chrome)
    #[arg(long)]
    pub webdriver_url: Option<String>,

    /// Set viewport size (WIDTHxHEIGHT, e.g., 1920x1080)
    #[arg(long)]
    pub viewport: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub no_headless: bool,
}

impl BrowserArgs {
    pub fn options(&self) -> Result<BrowserOptions> {
        let browser_type: BrowserType = self.browser.parse()?;
        let viewport = self
            .viewport
            .as_deref()
            .map(ViewportSize::parse)
            .transpose()?;

        Ok(BrowserOptions {
            browser_type,
            webdriver_url: self.webdriver_url.clone(),
            viewport,
            headless: !self.no_headless,
        })
    }

    pub async fn connect(&self) -> Result<Browser> {
        Browser::connect(self.options()?).await
    }
}

/// Pretty JSON to stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

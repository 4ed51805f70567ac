use anyhow::{Context, Result};
use async_trait::async_trait;
use fantoccini::actions::{InputSource, MouseActions, PointerAction, MOUSE_BUTTON_LEFT};
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::annotate::MarkerPlan;
use crate::host::{FoundElement, HostError, PageHost, Query};
use crate::types::{Point, ViewportSize};

/// Upper bound on elements inspected per query
const MAX_QUERY_MATCHES: usize = 20;

/// Browser instance for WebDriver automation
pub struct Browser {
    client: Client,
    browser_type: BrowserType,
}

/// Supported browser types
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum BrowserType {
    /// Mozilla Firefox
    Firefox,
    /// Google Chrome/Chromium
    Chrome,
}

impl std::str::FromStr for BrowserType {
    type Err = anyhow::Error;

    /// Parse browser type from string (case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "firefox" => Ok(BrowserType::Firefox),
            "chrome" | "chromium" => Ok(BrowserType::Chrome),
            _ => anyhow::bail!("Unsupported browser: {}", s),
        }
    }
}

impl BrowserType {
    /// Default WebDriver URL for this browser type
    pub fn default_webdriver_url(&self) -> &'static str {
        match self {
            BrowserType::Firefox => "http://localhost:4444",
            BrowserType::Chrome => "http://localhost:9515",
        }
    }

    fn driver_name(&self) -> &'static str {
        match self {
            BrowserType::Firefox => "geckodriver",
            BrowserType::Chrome => "chromedriver",
        }
    }
}

/// How to reach and configure the browser
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub browser_type: BrowserType,
    /// Overrides the per-browser default
    pub webdriver_url: Option<String>,
    pub viewport: Option<ViewportSize>,
    pub headless: bool,
}

impl Browser {
    /// Connect to a running WebDriver and open a session
    pub async fn connect(options: BrowserOptions) -> Result<Self> {
        let browser_type = options.browser_type;
        let webdriver_url = options
            .webdriver_url
            .clone()
            .unwrap_or_else(|| browser_type.default_webdriver_url().to_string());
        info!("Connecting to {:?} WebDriver at {}", browser_type, webdriver_url);

        if !Self::is_webdriver_running(&webdriver_url).await {
            let driver = browser_type.driver_name();
            anyhow::bail!(
                "Cannot connect to {} WebDriver at {}.\n\
                Please ensure {} is running:\n\
                  For Firefox: geckodriver --port 4444\n\
                  For Chrome: chromedriver --port 9515",
                driver,
                webdriver_url,
                driver
            );
        }

        let caps = Self::capabilities(&options)?;
        debug!("Requesting capabilities: {:?}", caps);

        let client = ClientBuilder::rustls()
            .capabilities(caps)
            .connect(&webdriver_url)
            .await
            .context("Failed to connect to WebDriver")?;

        if let Some(vp) = &options.viewport {
            debug!("Setting viewport to {}x{}", vp.width, vp.height);
            if let Err(e) = client.set_window_size(vp.width, vp.height).await {
                debug!("Note: Could not set window size: {}", e);
            }
        }

        Ok(Browser {
            client,
            browser_type,
        })
    }

    fn capabilities(options: &BrowserOptions) -> Result<serde_json::Map<String, Value>> {
        let mut caps = serde_json::Map::new();

        match options.browser_type {
            BrowserType::Firefox => {
                let mut args = Vec::new();
                if options.headless {
                    args.push("--headless".to_string());
                }
                if let Some(vp) = &options.viewport {
                    args.push(format!("--width={}", vp.width));
                    args.push(format!("--height={}", vp.height));
                }
                caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
            }
            BrowserType::Chrome => {
                let mut args = vec!["--no-sandbox".to_string()];
                if options.headless {
                    args.push("--headless=new".to_string());
                    args.push("--disable-gpu".to_string());
                    args.push("--disable-dev-shm-usage".to_string());
                }
                if let Some(vp) = &options.viewport {
                    args.push(format!("--window-size={},{}", vp.width, vp.height));
                }

                // Chrome refuses to share a profile directory between sessions
                let profile = tempfile::Builder::new()
                    .prefix("webpilot-chrome-")
                    .tempdir()?;
                #[allow(deprecated)]
                let profile_path = profile.into_path();
                args.push(format!("--user-data-dir={}", profile_path.display()));

                caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
            }
        }

        Ok(caps)
    }

    async fn is_webdriver_running(url: &str) -> bool {
        let status_url = format!("{}/status", url.trim_end_matches('/'));

        match reqwest::get(&status_url).await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    pub fn browser_type(&self) -> BrowserType {
        self.browser_type
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, HostError> {
        self.client.execute(script, args).await.map_err(host_error)
    }

    async fn pointer(&self, actions: MouseActions) -> Result<(), HostError> {
        self.client
            .perform_actions(actions)
            .await
            .map_err(host_error)?;
        self.client.release_actions().await.map_err(host_error)
    }

    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

fn host_error(err: CmdError) -> HostError {
    HostError::from_message(err.to_string())
}

fn element_arg(element: &Element) -> Result<Value, HostError> {
    serde_json::to_value(element).map_err(|e| HostError::Other(e.to_string()))
}

/// XPath string literal for arbitrary text
fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{}'", text);
    }
    if !text.contains('"') {
        return format!("\"{}\"", text);
    }
    let parts: Vec<String> = text
        .split('\'')
        .map(|part| format!("'{}'", part))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// Tag names come from parsed markup, but are still spliced into an expression
fn xpath_tag(tag: &str) -> &str {
    if !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        tag
    } else {
        "*"
    }
}

/// Exact normalized match, or prefix match when the name was truncated with "..."
fn xpath_text_equals(expr: &str, text: &str) -> String {
    match text.strip_suffix("...") {
        Some(prefix) => format!(
            "starts-with(normalize-space({}), {})",
            expr,
            xpath_literal(prefix.trim())
        ),
        None => format!("normalize-space({}) = {}", expr, xpath_literal(text)),
    }
}

fn implicit_role_paths(role: &str) -> &'static [&'static str] {
    match role {
        "button" => &[
            "//button",
            "//input[@type='button' or @type='submit' or @type='reset' or @type='image']",
        ],
        "link" => &["//a[@href]"],
        "textbox" => &[
            "//textarea",
            "//input[not(@type) or @type='text' or @type='email' or @type='tel' or @type='url']",
        ],
        "searchbox" => &["//input[@type='search']"],
        "combobox" => &["//select"],
        "checkbox" => &["//input[@type='checkbox']"],
        "radio" => &["//input[@type='radio']"],
        "option" => &["//option"],
        "spinbutton" => &["//input[@type='number']"],
        "slider" => &["//input[@type='range']"],
        _ => &[],
    }
}

/// Translate a host query into XPath
fn to_xpath(query: &Query) -> String {
    match query {
        Query::Marker {
            attribute,
            reference,
        } => format!(
            "//*[@{}={}]",
            xpath_tag(attribute),
            xpath_literal(&reference.to_string())
        ),
        Query::RoleName { role, name } => {
            let role_lit = xpath_literal(role);
            let mut paths = vec![format!("//*[@role={}]", role_lit)];
            paths.extend(implicit_role_paths(role).iter().map(|p| p.to_string()));

            let name_lit = xpath_literal(name);
            format!(
                "({})[not(@role) or @role={}][normalize-space(@aria-label) = {} or {} or normalize-space(@value) = {} or normalize-space(@title) = {}]",
                paths.join(" | "),
                role_lit,
                name_lit,
                xpath_text_equals(".", name),
                name_lit,
                name_lit
            )
        }
        Query::Label(label) => {
            let lit = xpath_literal(label);
            format!(
                "//*[normalize-space(@aria-label) = {lit}] \
                 | //*[@id = //label[normalize-space(.) = {lit}]/@for] \
                 | //label[contains(normalize-space(.), {lit})]//*[self::input or self::textarea or self::select]"
            )
        }
        Query::Placeholder(text) => {
            let lit = xpath_literal(text);
            format!("//*[@placeholder = {lit} or @data-placeholder = {lit}]")
        }
        Query::Name(name) => format!("//*[@name = {}]", xpath_literal(name)),
        Query::DomId(id) => format!("//*[@id = {}]", xpath_literal(id)),
        Query::TextWithin { tag, text } => format!(
            "//{}[contains(normalize-space(.), {})]",
            xpath_tag(tag),
            xpath_literal(text)
        ),
    }
}

/// W3C WebDriver code points for named keys
fn key_code(key: &str) -> Option<char> {
    let code = match key.to_lowercase().as_str() {
        "enter" | "return" => '\u{E007}',
        "tab" => '\u{E004}',
        "escape" | "esc" => '\u{E00C}',
        "backspace" => '\u{E003}',
        "delete" => '\u{E017}',
        "space" => '\u{E00D}',
        "arrowup" | "up" => '\u{E013}',
        "arrowdown" | "down" => '\u{E015}',
        "arrowleft" | "left" => '\u{E012}',
        "arrowright" | "right" => '\u{E014}',
        "home" => '\u{E011}',
        "end" => '\u{E010}',
        "pageup" => '\u{E00E}',
        "pagedown" => '\u{E00F}',
        _ => return None,
    };
    Some(code)
}

const MARKER_SCRIPT: &str = r#"
    const attribute = arguments[0];
    const plans = arguments[1];

    document.querySelectorAll('[' + attribute + ']').forEach(el => el.removeAttribute(attribute));

    const marked = new Set();
    const normalize = text => (text || '').replace(/\s+/g, ' ').trim();
    const locate = locator => {
        switch (locator.kind) {
            case 'dom_id':
                return document.getElementById(locator.value);
            case 'name':
                return document.querySelector(locator.value.tag + '[name="' + CSS.escape(locator.value.name) + '"]');
            case 'structural':
                return document.querySelector(locator.value);
            case 'text':
                return Array.from(document.getElementsByTagName(locator.value.tag))
                    .find(el => !marked.has(el) && normalize(el.textContent).includes(locator.value.text)) || null;
        }
        return null;
    };

    return plans.map(plan => {
        for (let i = 0; i < plan.locators.length; i++) {
            let el = null;
            try { el = locate(plan.locators[i]); } catch (e) { el = null; }
            if (el && !marked.has(el)) {
                el.setAttribute(attribute, String(plan.reference));
                marked.add(el);
                return i;
            }
        }
        return null;
    });
"#;

const FILL_SCRIPT: &str = r#"
    const el = arguments[0];
    const value = arguments[1];
    el.focus();
    const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype
        : el instanceof HTMLSelectElement ? HTMLSelectElement.prototype
        : HTMLInputElement.prototype;
    const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
    setter.call(el, value);
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
"#;

#[async_trait]
impl PageHost for Browser {
    type Element = Element;

    async fn navigate(&self, url: &str) -> Result<(), HostError> {
        info!("Navigating to {}", url);
        self.client.goto(url).await.map_err(host_error)?;

        // Try waiting for page to be ready (max 2 seconds)
        for _ in 0..20 {
            match self
                .client
                .execute("return document.readyState === 'complete';", vec![])
                .await
            {
                Ok(val) if val.as_bool().unwrap_or(false) => break,
                _ => tokio::time::sleep(tokio::time::Duration::from_millis(100)).await,
            }
        }

        Ok(())
    }

    async fn current_url(&self) -> Result<String, HostError> {
        Ok(self
            .client
            .current_url()
            .await
            .map_err(host_error)?
            .to_string())
    }

    async fn title(&self) -> Result<String, HostError> {
        self.client.title().await.map_err(host_error)
    }

    async fn page_source(&self) -> Result<String, HostError> {
        self.client.source().await.map_err(host_error)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, HostError> {
        self.client.screenshot().await.map_err(host_error)
    }

    async fn write_markers(
        &self,
        attribute: &str,
        plans: &[MarkerPlan],
    ) -> Result<Vec<Option<usize>>, HostError> {
        let plans = serde_json::to_value(plans).map_err(|e| HostError::Other(e.to_string()))?;
        let result = self
            .execute(MARKER_SCRIPT, vec![json!(attribute), plans])
            .await?;

        let hits = result
            .as_array()
            .ok_or_else(|| HostError::Other(format!("unexpected marker script result: {}", result)))?;
        Ok(hits
            .iter()
            .map(|hit| hit.as_u64().map(|i| i as usize))
            .collect())
    }

    async fn query(&self, query: &Query) -> Result<Vec<FoundElement<Element>>, HostError> {
        let xpath = to_xpath(query);
        debug!("Query {} as {}", query, xpath);

        let elements = self
            .client
            .find_all(Locator::XPath(&xpath))
            .await
            .map_err(host_error)?;

        let mut found = Vec::new();
        for element in elements.into_iter().take(MAX_QUERY_MATCHES) {
            // A node that went stale between lookup and inspection is simply not usable
            let visible = element.is_displayed().await.unwrap_or(false);
            let enabled = element.is_enabled().await.unwrap_or(false);
            found.push(FoundElement {
                handle: element,
                visible,
                enabled,
            });
        }
        Ok(found)
    }

    async fn click(&self, element: &Element) -> Result<(), HostError> {
        element.click().await.map_err(host_error)
    }

    async fn focus(&self, element: &Element) -> Result<(), HostError> {
        element.click().await.map_err(host_error)?;
        self.execute("arguments[0].focus();", vec![element_arg(element)?])
            .await
            .map(|_| ())
    }

    async fn fill(&self, element: &Element, text: &str) -> Result<(), HostError> {
        self.execute(FILL_SCRIPT, vec![element_arg(element)?, json!(text)])
            .await
            .map(|_| ())
    }

    async fn type_keys(&self, text: &str) -> Result<(), HostError> {
        let active = self.client.active_element().await.map_err(host_error)?;
        active.send_keys(text).await.map_err(host_error)
    }

    async fn press_key(&self, key: &str) -> Result<(), HostError> {
        let keys = match key_code(key) {
            Some(code) => code.to_string(),
            None if key.chars().count() == 1 => key.to_string(),
            None => return Err(HostError::InvalidQuery(format!("unknown key '{}'", key))),
        };
        let active = self.client.active_element().await.map_err(host_error)?;
        active.send_keys(&keys).await.map_err(host_error)
    }

    async fn hover(&self, element: &Element) -> Result<(), HostError> {
        let actions = MouseActions::new("mouse".to_string()).then(PointerAction::MoveToElement {
            element: element.clone(),
            duration: None,
            x: 0,
            y: 0,
        });
        self.pointer(actions).await
    }

    async fn scroll_into_view(&self, element: &Element) -> Result<(), HostError> {
        self.execute(
            "arguments[0].scrollIntoView({ block: 'center', inline: 'nearest' });",
            vec![element_arg(element)?],
        )
        .await
        .map(|_| ())
    }

    async fn click_at(&self, point: Point) -> Result<(), HostError> {
        let actions = MouseActions::new("mouse".to_string())
            .then(PointerAction::MoveTo {
                duration: None,
                x: point.x,
                y: point.y,
            })
            .then(PointerAction::Down {
                button: MOUSE_BUTTON_LEFT,
            })
            .then(PointerAction::Up {
                button: MOUSE_BUTTON_LEFT,
            });
        self.pointer(actions).await
    }

    async fn hover_at(&self, point: Point) -> Result<(), HostError> {
        let actions = MouseActions::new("mouse".to_string()).then(PointerAction::MoveTo {
            duration: None,
            x: point.x,
            y: point.y,
        });
        self.pointer(actions).await
    }

    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<(), HostError> {
        self.execute("window.scrollBy(arguments[0], arguments[1]);", vec![json!(dx), json!(dy)])
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
#[path = "webdriver_test.rs"]
mod webdriver_test;

//! Browser tool implementation.
//!
//! Page automation over a host-provided `BrowserDriver`. No driver ships
//! with the crate; register a `BrowserTool` with the router once one is
//! available.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::action::{decode, ActionSet, ActionSpec, ParamKind, ParamSpec};
use super::dispatch::Dispatcher;
use super::Tool;
use crate::error::{ActionFailure, ToolError};

/// Capability contract for browser backends.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    /// Current page HTML.
    async fn html(&self) -> Result<String>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn fill_in(&self, selector: &str, text: &str) -> Result<()>;

    /// PNG screenshot of the current page.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn close(&self) -> Result<()>;
}

pub static BROWSER_ACTIONS: ActionSet = ActionSet {
    tool: "browser",
    params: &[
        ParamSpec {
            name: "url",
            kind: ParamKind::String,
            description: "Absolute http(s) URL to open",
        },
        ParamSpec {
            name: "selector",
            kind: ParamKind::String,
            description: "CSS selector of the target element",
        },
        ParamSpec {
            name: "text",
            kind: ParamKind::String,
            description: "Text to enter into the element",
        },
    ],
    actions: &[
        ActionSpec {
            name: "goto",
            description: "Navigate to a URL",
            required: &["url"],
            optional: &[],
        },
        ActionSpec {
            name: "html",
            description: "Return the current page HTML",
            required: &[],
            optional: &[],
        },
        ActionSpec {
            name: "click",
            description: "Click an element",
            required: &["selector"],
            optional: &[],
        },
        ActionSpec {
            name: "fill_in",
            description: "Type text into an input element",
            required: &["selector", "text"],
            optional: &[],
        },
        ActionSpec {
            name: "screenshot",
            description: "Capture the page as a base64 PNG",
            required: &[],
            optional: &[],
        },
        ActionSpec {
            name: "close",
            description: "Close the browser session",
            required: &[],
            optional: &[],
        },
    ],
};

#[derive(Debug, Deserialize)]
struct GotoParams {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ClickParams {
    selector: String,
}

#[derive(Debug, Deserialize)]
struct FillInParams {
    selector: String,
    text: String,
}

pub struct BrowserTool {
    driver: Arc<dyn BrowserDriver>,
    dispatcher: Dispatcher,
}

impl BrowserTool {
    pub fn new(driver: Arc<dyn BrowserDriver>, dispatcher: Dispatcher) -> Self {
        Self { driver, dispatcher }
    }
}

#[async_trait]
impl Tool for BrowserTool {
    fn description(&self) -> &str {
        "Drive a web browser: open a URL, read the page HTML, click or fill \
         elements by CSS selector, take a screenshot, and close the session."
    }

    fn actions(&self) -> &'static ActionSet {
        &BROWSER_ACTIONS
    }

    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    async fn perform(&self, action: &'static str, params: Value) -> Result<Value, ToolError> {
        match action {
            "goto" => {
                let p: GotoParams = decode(action, params)?;
                check_url(&p.url)?;
                self.driver.goto(&p.url).await?;
                Ok(json!({ "url": p.url }))
            }
            "html" => {
                let html = self.driver.html().await?;
                Ok(json!({ "length": html.len(), "html": html }))
            }
            "click" => {
                let p: ClickParams = decode(action, params)?;
                self.driver.click(&p.selector).await?;
                Ok(json!({ "clicked": p.selector }))
            }
            "fill_in" => {
                let p: FillInParams = decode(action, params)?;
                self.driver.fill_in(&p.selector, &p.text).await?;
                Ok(json!({ "filled": p.selector, "chars": p.text.chars().count() }))
            }
            "screenshot" => {
                let png = self.driver.screenshot().await?;
                debug!(bytes = png.len(), "BrowserTool::screenshot: captured");
                Ok(json!({
                    "format": "png",
                    "bytes": png.len(),
                    "data": base64::engine::general_purpose::STANDARD.encode(&png),
                }))
            }
            "close" => {
                self.driver.close().await?;
                Ok(json!({ "closed": true }))
            }
            other => Err(ActionFailure::unsupported_action(
                self.name(),
                other,
                &BROWSER_ACTIONS.names(),
            )
            .into()),
        }
    }
}

fn check_url(url: &str) -> Result<(), ActionFailure> {
    let lower = url.trim().to_ascii_lowercase();
    let rest = lower
        .strip_prefix("http://")
        .or_else(|| lower.strip_prefix("https://"));
    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(ActionFailure::invalid_parameter(format!(
            "'url' must be an absolute http or https URL, got '{}'",
            url
        ))),
    }
}

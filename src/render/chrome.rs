//! Headless Chrome renderer backed by chromiumoxide

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, SetBlockedUrLsParams};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use super::{RenderCapability, RenderConfig, RenderError, RenderedPage, RendererFactory};

const HIDE_WEBDRIVER: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined })";

const CHROME_CANDIDATES: [&str; 5] = [
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
];

/// Locate the Chrome executable once per process.
fn chrome_executable() -> Option<&'static Path> {
    static PATH: OnceLock<Option<PathBuf>> = OnceLock::new();
    PATH.get_or_init(|| {
        std::env::var_os("CHROME_PATH")
            .map(PathBuf::from)
            .filter(|p| p.exists())
            .or_else(|| {
                CHROME_CANDIDATES
                    .iter()
                    .map(PathBuf::from)
                    .find(|p| p.exists())
            })
    })
    .as_deref()
}

/// Script run before any page script on every document the page loads
fn automation_override() -> AddScriptToEvaluateOnNewDocumentParams {
    AddScriptToEvaluateOnNewDocumentParams::new(HIDE_WEBDRIVER)
}

fn cdp_error(err: impl std::fmt::Display) -> RenderError {
    RenderError::classify(err.to_string())
}

/// A live headless Chrome process
pub struct ChromeRenderer {
    browser: Browser,
    handler: JoinHandle<()>,
    blocked_patterns: Vec<String>,
    script_timeout: Duration,
    hide_automation: bool,
}

#[async_trait]
impl RenderCapability for ChromeRenderer {
    #[instrument(skip(self))]
    async fn load(&mut self, url: &str, timeout: Duration) -> Result<RenderedPage, RenderError> {
        if self.handler.is_finished() {
            return Err(RenderError::Crashed("browser handler exited".to_string()));
        }

        let page = self.browser.new_page("about:blank").await.map_err(cdp_error)?;

        if let Err(e) = page.execute(EnableParams::default()).await {
            debug!(error = %e, "Failed to enable network domain");
        }
        if !self.blocked_patterns.is_empty() {
            if let Err(e) = page
                .execute(SetBlockedUrLsParams::new(self.blocked_patterns.clone()))
                .await
            {
                debug!(error = %e, "Failed to set blocked URL patterns");
            }
        }
        if self.hide_automation {
            let install = tokio::time::timeout(
                self.script_timeout,
                page.execute(automation_override()),
            )
            .await;
            match install {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "Failed to install automation override"),
                Err(_) => warn!("Timed out installing automation override"),
            }
        }

        let navigation = tokio::time::timeout(timeout, async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            let html = page.content().await?;
            let title = page.get_title().await?.unwrap_or_default();
            let final_url = page.url().await?.unwrap_or_else(|| url.to_string());
            Ok::<_, chromiumoxide::error::CdpError>((html, title, final_url))
        })
        .await;

        if let Err(e) = page.close().await {
            debug!(error = %e, "Failed to close page");
        }

        match navigation {
            Err(_) => Err(RenderError::Timeout(timeout)),
            Ok(Err(e)) => Err(cdp_error(e)),
            Ok(Ok((html, title, final_url))) => Ok(RenderedPage {
                url: final_url,
                html,
                title: title.trim().to_string(),
                status: None,
            }),
        }
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Failed to close browser cleanly");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
        Ok(())
    }
}

/// Launches headless Chrome processes
#[derive(Debug, Default, Clone)]
pub struct ChromeRendererFactory;

impl ChromeRendererFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RendererFactory for ChromeRendererFactory {
    async fn launch(
        &self,
        config: &RenderConfig,
        launch: usize,
    ) -> Result<Box<dyn RenderCapability>, RenderError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(config.page_load_timeout)
            .arg(format!("--user-agent={}", config.user_agent_for(launch)))
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--blink-settings=imagesEnabled=false");
        if config.hide_automation {
            builder = builder.arg("--disable-blink-features=AutomationControlled");
        }
        if let Some(path) = chrome_executable() {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder.build().map_err(RenderError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler stopped");
                    break;
                }
            }
        });

        Ok(Box::new(ChromeRenderer {
            browser,
            handler,
            blocked_patterns: config.blocked_resource_patterns.clone(),
            script_timeout: config.script_timeout,
            hide_automation: config.hide_automation,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automation_override_runs_on_new_documents() {
        let params = automation_override();
        assert!(params.source.contains("navigator, 'webdriver'"));
    }
}

//! Plain HTTP renderer backed by reqwest
//!
//! Fetches the raw document without executing scripts. Subresources are never
//! requested, so the blocked resource patterns are satisfied trivially.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use super::{RenderCapability, RenderConfig, RenderError, RenderedPage, RendererFactory, title_from_html};

/// Renderer that loads pages with a single HTTP GET
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    /// Build a renderer with the given user agent
    pub fn new(user_agent: &str, config: &RenderConfig) -> Result<Self, RenderError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(config.page_load_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| RenderError::Launch(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RenderCapability for HttpRenderer {
    #[instrument(skip(self))]
    async fn load(&mut self, url: &str, timeout: Duration) -> Result<RenderedPage, RenderError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RenderError::Timeout(timeout)
                } else {
                    RenderError::from(e)
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(RenderError::RateLimited(status));
        }
        if !response.status().is_success() {
            debug!(status, "Error status");
            return Err(RenderError::Status(status));
        }

        let final_url = response.url().to_string();
        let html = response.text().await.map_err(RenderError::from)?;
        let title = title_from_html(&html);
        debug!(status, bytes = html.len(), "Loaded page");

        Ok(RenderedPage {
            url: final_url,
            html,
            title,
            status: Some(status),
        })
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Launches [`HttpRenderer`]s, rotating the configured user agents
#[derive(Debug, Default, Clone)]
pub struct HttpRendererFactory;

impl HttpRendererFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RendererFactory for HttpRendererFactory {
    async fn launch(
        &self,
        config: &RenderConfig,
        launch: usize,
    ) -> Result<Box<dyn RenderCapability>, RenderError> {
        let user_agent = config.user_agent_for(launch);
        Ok(Box::new(HttpRenderer::new(user_agent, config)?))
    }
}

//! Page rendering for the crawler
//!
//! A [`RenderSession`] owns exactly one renderer at a time and drives it through
//! an explicit lifecycle, restarting it proactively and after crashes. Renderers
//! are plugged in through [`RendererFactory`]; the default [`HttpRenderer`]
//! fetches raw markup, and the `chrome` feature adds a headless Chrome backend.

#[cfg(feature = "chrome")]
mod chrome;
mod config;
mod error;
mod http;
mod session;

#[cfg(feature = "chrome")]
pub use chrome::ChromeRendererFactory;
pub use config::{DESKTOP_USER_AGENTS, RenderConfig, RenderConfigBuilder};
pub use error::RenderError;
pub use http::{HttpRenderer, HttpRendererFactory};
pub use session::{RenderSession, SessionState};

use std::time::Duration;

use async_trait::async_trait;

/// Markup and metadata of one loaded page
#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    /// Final URL after redirects
    pub url: String,

    /// Rendered HTML
    pub html: String,

    /// Document title, empty when absent
    pub title: String,

    /// HTTP status of the main document, when the renderer can observe it
    pub status: Option<u16>,
}

/// A live renderer capable of loading pages.
#[async_trait]
pub trait RenderCapability: Send {
    /// Load `url` and return its rendered markup within `timeout`.
    async fn load(&mut self, url: &str, timeout: Duration) -> Result<RenderedPage, RenderError>;

    /// Release the renderer and every resource it holds.
    async fn close(&mut self) -> Result<(), RenderError>;
}

/// Launches renderers for a [`RenderSession`].
#[async_trait]
pub trait RendererFactory: Send + Sync {
    /// Launch a fresh renderer. `launch` counts launches made by the calling session.
    async fn launch(
        &self,
        config: &RenderConfig,
        launch: usize,
    ) -> Result<Box<dyn RenderCapability>, RenderError>;
}

/// Extract the `<title>` text from raw markup.
pub(crate) fn title_from_html(html: &str) -> String {
    let document = scraper::Html::parse_document(html);
    match scraper::Selector::parse("title") {
        Ok(selector) => document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

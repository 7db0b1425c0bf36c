//! Error types for the crawler module

use crate::error::Error as CrateError;
use crate::render::RenderError;
use thiserror::Error;

/// Error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlError {
    /// URL parsing error
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// The start URL cannot be crawled
    #[error("Invalid start URL: {0}")]
    InvalidStartUrl(String),

    /// The first rendering session could not be started
    #[error("Failed to start rendering session: {0}")]
    SessionInit(#[source] RenderError),

    /// The rendering session could not be recovered mid-run
    #[error("Rendering session lost after {pages_scraped} pages: {source}")]
    SessionLost {
        /// Pages persisted before the session was lost
        pages_scraped: usize,
        /// Last restart error
        #[source]
        source: RenderError,
    },

    /// Too many consecutive fetch failures
    #[error("Circuit breaker opened after {consecutive_failures} consecutive failures ({pages_scraped} pages scraped)")]
    CircuitOpen {
        /// Failures in a row when the run stopped
        consecutive_failures: u32,
        /// Pages persisted before the run stopped
        pages_scraped: usize,
    },

    /// Page persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl CrawlError {
    /// Pages already persisted when a run ended with this error
    pub fn pages_scraped(&self) -> Option<usize> {
        match self {
            Self::SessionLost { pages_scraped, .. } | Self::CircuitOpen { pages_scraped, .. } => {
                Some(*pages_scraped)
            }
            _ => None,
        }
    }
}

impl From<CrawlError> for CrateError {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::UrlParse(e) => CrateError::Other(format!("URL parse error: {}", e)),
            _ => CrateError::Crawl(err.to_string()),
        }
    }
}

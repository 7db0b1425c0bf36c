//! # Crawler Configuration Module
//!
//! This module provides configuration options for a crawl run: page and
//! iteration caps, retry and circuit-breaker limits, frontier bounds, and the
//! media scanning policy. It uses a builder pattern for flexible configuration.
//!
//! ## Key Components
//!
//! - `CrawlerConfig`: The main configuration struct with crawl parameters
//! - `CrawlerConfigBuilder`: Builder pattern implementation for easier configuration
//! - `MediaScanPolicy`: Which pages are scanned for audio and video

use std::str::FromStr;

use crate::crawler::block::BlockDetector;
use crate::crawler::content_extraction::ExtractionOptions;
use crate::processor::ProcessorConfig;
use crate::render::RenderConfig;

/// Which pages of a crawl are scanned for media
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MediaScanPolicy {
    /// Only the start URL
    #[default]
    LandingPageOnly,
    /// Every page with content
    EveryPage,
    /// Never
    Disabled,
}

impl MediaScanPolicy {
    pub fn should_scan(&self, is_landing_page: bool) -> bool {
        match self {
            Self::LandingPageOnly => is_landing_page,
            Self::EveryPage => true,
            Self::Disabled => false,
        }
    }
}

impl FromStr for MediaScanPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "landing" | "landing-page" | "landing-page-only" => Ok(Self::LandingPageOnly),
            "every" | "every-page" | "all" => Ok(Self::EveryPage),
            "off" | "none" | "disabled" => Ok(Self::Disabled),
            other => Err(format!("unknown media scan policy: {other}")),
        }
    }
}

/// Configuration for the crawler
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Maximum number of pages persisted per run
    pub max_pages: usize,

    /// Loop iterations allowed per page of the cap
    pub iteration_factor: usize,

    /// Fetch attempts per URL
    pub max_retries: u32,

    /// Consecutive failures that open the circuit breaker
    pub max_consecutive_failures: u32,

    /// Pending URLs kept in the frontier
    pub max_pending_urls: usize,

    /// Anchors examined per page
    pub max_links_examined: usize,

    /// New URLs enqueued per page
    pub max_links_enqueued: usize,

    /// Report progress every this many pages
    pub progress_interval: usize,

    /// Content is truncated to this many characters
    pub max_content_chars: usize,

    /// Media references kept per page
    pub max_media_per_page: usize,

    /// Which pages are scanned for media
    pub media_scan: MediaScanPolicy,

    /// Block page detection strategy
    pub block_detector: BlockDetector,

    /// Rendering session settings
    pub render: RenderConfig,

    /// Chunking and batching settings
    pub processor: ProcessorConfig,

    /// Document index name, `site-{domain_id}` when unset
    pub index_name: Option<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: 1000,
            iteration_factor: 3,
            max_retries: 3,
            max_consecutive_failures: 10,
            max_pending_urls: 1000,
            max_links_examined: 100,
            max_links_enqueued: 50,
            progress_interval: 5,
            max_content_chars: 50_000,
            max_media_per_page: 3,
            media_scan: MediaScanPolicy::default(),
            block_detector: BlockDetector::default(),
            render: RenderConfig::default(),
            processor: ProcessorConfig::default(),
            index_name: None,
        }
    }
}

/// Builder for CrawlerConfig
#[derive(Debug, Default)]
pub struct CrawlerConfigBuilder {
    config: CrawlerConfig,
}

impl CrawlerConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CrawlerConfig::default(),
        }
    }

    /// Set the maximum number of pages to crawl
    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.config.max_pages = max_pages;
        self
    }

    /// Set the iteration cap as a multiple of the page cap
    pub fn iteration_factor(mut self, factor: usize) -> Self {
        self.config.iteration_factor = factor;
        self
    }

    /// Set the fetch attempts per URL
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Set the circuit breaker threshold
    pub fn max_consecutive_failures(mut self, failures: u32) -> Self {
        self.config.max_consecutive_failures = failures;
        self
    }

    /// Set the frontier capacity
    pub fn max_pending_urls(mut self, max: usize) -> Self {
        self.config.max_pending_urls = max;
        self
    }

    /// Set the anchors examined per page
    pub fn max_links_examined(mut self, max: usize) -> Self {
        self.config.max_links_examined = max;
        self
    }

    /// Set the new URLs enqueued per page
    pub fn max_links_enqueued(mut self, max: usize) -> Self {
        self.config.max_links_enqueued = max;
        self
    }

    /// Set the progress reporting interval
    pub fn progress_interval(mut self, pages: usize) -> Self {
        self.config.progress_interval = pages;
        self
    }

    /// Set the content length ceiling
    pub fn max_content_chars(mut self, chars: usize) -> Self {
        self.config.max_content_chars = chars;
        self
    }

    /// Set the media references kept per page
    pub fn max_media_per_page(mut self, max: usize) -> Self {
        self.config.max_media_per_page = max;
        self
    }

    /// Set the media scanning policy
    pub fn media_scan(mut self, policy: MediaScanPolicy) -> Self {
        self.config.media_scan = policy;
        self
    }

    /// Set the block detection strategy
    pub fn block_detector(mut self, detector: BlockDetector) -> Self {
        self.config.block_detector = detector;
        self
    }

    /// Set the rendering session configuration
    pub fn render(mut self, render: RenderConfig) -> Self {
        self.config.render = render;
        self
    }

    /// Set the processor configuration
    pub fn processor(mut self, processor: ProcessorConfig) -> Self {
        self.config.processor = processor;
        self
    }

    /// Set the document index name
    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.config.index_name = Some(name.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> CrawlerConfig {
        self.config
    }
}

impl CrawlerConfig {
    /// Create a new builder
    pub fn builder() -> CrawlerConfigBuilder {
        CrawlerConfigBuilder::new()
    }

    /// Total loop iterations allowed for one run
    pub fn max_iterations(&self) -> usize {
        self.max_pages.saturating_mul(self.iteration_factor.max(1))
    }

    /// Index name used for documents of `domain_id`
    pub fn index_name_for(&self, domain_id: i64) -> String {
        self.index_name
            .clone()
            .unwrap_or_else(|| format!("site-{domain_id}"))
    }

    pub(crate) fn extraction_options(&self, scan_media: bool) -> ExtractionOptions {
        ExtractionOptions {
            max_content_chars: self.max_content_chars,
            max_media: self.max_media_per_page,
            max_links_examined: self.max_links_examined,
            scan_media,
        }
    }
}

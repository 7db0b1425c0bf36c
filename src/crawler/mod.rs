//! Website crawler module
//!
//! This module drives one crawl run: a breadth-first [`Frontier`] of
//! normalized URLs, pages fetched through a
//! [`RenderSession`](crate::render::RenderSession), block detection, content
//! and media extraction, and hand-off of every persisted page to the batch
//! indexer.

mod block;
mod config;
mod content_extraction;
mod controller;
mod error;
mod frontier;

pub use block::BlockDetector;
pub use config::{CrawlerConfig, CrawlerConfigBuilder, MediaScanPolicy};
pub use content_extraction::{
    ExtractedContent, ExtractionOptions, PageAnalysis, analyze_page, canonical_video_url,
    extract_content, extract_links, extract_media_refs,
};
pub use controller::{CrawlController, CrawlOutcome, CrawlServices, StopReason};
pub use error::CrawlError;
pub use frontier::{Frontier, FrontierEntry, normalize_url, same_domain};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::index::DbError;
use crate::media::{MediaRef, MediaTranscription};

/// Characters of content kept in [`ScrapedPage::content_preview`]
pub const PREVIEW_CHARS: usize = 200;

/// One successfully extracted URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedPage {
    /// Row id, 0 until persisted
    pub id: i64,

    pub domain_id: i64,

    /// Normalized URL
    pub url: String,

    pub title: String,

    /// Extracted text followed by any media transcripts
    pub content: String,

    pub content_preview: String,

    pub word_count: usize,

    pub tags: Vec<String>,

    pub media_refs: Vec<MediaRef>,

    pub transcriptions: Vec<MediaTranscription>,

    pub last_updated: DateTime<Utc>,
}

impl ScrapedPage {
    /// Build an unpersisted page, deriving the preview and word count.
    pub fn new(
        domain_id: i64,
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            id: 0,
            domain_id,
            url: url.into(),
            title: title.into(),
            content_preview: preview(&content),
            word_count: content.split_whitespace().count(),
            content,
            tags: Vec::new(),
            media_refs: Vec::new(),
            transcriptions: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Where scraped pages are persisted
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Persist a page and return its id.
    async fn insert_page(&self, page: &ScrapedPage) -> Result<i64, DbError>;
}

/// Receives the running page count of a crawl.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, pages_scraped: usize);
}

/// Progress sink that discards updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

#[async_trait]
impl ProgressSink for NoopProgress {
    async fn report(&self, _pages_scraped: usize) {}
}

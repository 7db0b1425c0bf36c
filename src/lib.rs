//! # siteindex - domain crawling and content indexing
//!
//! This crate crawls a single website through a restartable rendering session,
//! extracts the text of every page, transcribes the audio of embedded videos,
//! and stores pages plus embedded, tagged document chunks in LibSQL.
//!
//! ## Features
//!
//! - Crash-tolerant rendering sessions with proactive restarts
//! - Bounded frontier with per-URL retry caps and a circuit breaker
//! - Block page detection for bot walls and challenge pages
//! - Media transcription through yt-dlp, ffmpeg and whisper
//! - Word-bounded chunking, topical tags and vector indexing
//! - Job orchestration with a bounded admission queue
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use siteindex::crawler::{CrawlServices, CrawlerConfig};
//! use siteindex::index::Database;
//! use siteindex::jobs::{JobStore, Orchestrator, OrchestratorConfig};
//! use siteindex::processor::{HashEmbedder, KeywordTagger};
//! use siteindex::render::HttpRendererFactory;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Database::open("siteindex.db").await?;
//!     let services = CrawlServices {
//!         renderer: Arc::new(HttpRendererFactory::new()),
//!         media: None,
//!         tagger: Arc::new(KeywordTagger::default()),
//!         embedder: Arc::new(HashEmbedder::new(256)),
//!         index: Arc::new(db.clone()),
//!         pages: Arc::new(db.clone()),
//!     };
//!     let config = OrchestratorConfig::builder()
//!         .crawler(CrawlerConfig::builder().max_pages(50).build())
//!         .build();
//!     let orchestrator = Orchestrator::start(services, Arc::new(db), config);
//!
//!     let domain = orchestrator.register_domain("https://example.com").await?;
//!     let job_id = orchestrator.start_crawl(domain.id, &domain.url).await?;
//!     orchestrator.shutdown().await;
//!
//!     println!("{:?}", orchestrator.get_job_status(job_id).await?);
//!     Ok(())
//! }
//! ```

mod error;
pub mod model;

pub mod crawler;
pub mod index;
pub mod jobs;
pub mod media;
pub mod processor;
pub mod render;

pub use error::{Error, Result};

/// Re-export of types module for public use
pub mod prelude {
    pub use crate::crawler::{CrawlController, CrawlServices, CrawlerConfig, ScrapedPage};
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::index::Database;
    pub use crate::jobs::{JobStatus, Orchestrator, OrchestratorConfig};
}

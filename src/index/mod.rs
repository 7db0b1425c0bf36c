//! Document index and crawl persistence
//!
//! This module defines the [`DocumentIndex`] capability the batch indexer writes
//! to, and the libsql-backed [`Database`] that implements it alongside the
//! page, domain and job stores.

mod database;
pub mod error;
mod schema;

pub use database::{Database, PageListing};
pub use error::DbError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::media::MediaKind;

/// Shape of an index: every document vector has `dimensions` entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSchema {
    pub dimensions: usize,
}

/// One chunk of a page, or one media transcript, with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// URL of the page the document came from
    pub url: String,

    /// Page title, suffixed with the media kind for transcripts
    pub title: String,

    /// Chunk text or transcript
    pub content: String,

    /// Position of the chunk in the page; 0 for transcripts
    pub chunk_index: usize,

    pub domain_id: i64,

    pub tags: Vec<String>,

    pub embedding: Vec<f32>,

    /// Set for transcript documents
    pub media_kind: Option<MediaKind>,

    /// Set for transcript documents
    pub media_url: Option<String>,
}

/// A searchable document store.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Create the index if it does not exist yet.
    async fn ensure_index(&self, index_name: &str, schema: &IndexSchema) -> Result<(), DbError>;

    /// Insert or replace a document, keyed by url, chunk index and media url.
    async fn upsert(&self, index_name: &str, document: &IndexDocument) -> Result<(), DbError>;
}

//! Content processor module
//!
//! This module turns scraped pages into index documents: word-bounded
//! chunking, topical tagging, embedding generation and the batch indexer
//! that ties them together.

mod batch;
mod chunking;
mod config;
mod embedding;
mod error;
mod tagging;

pub use batch::{BatchIndexer, IndexStats};
pub use chunking::{TextChunk, chunk_text};
pub use config::{ChunkOptions, ProcessorConfig, ProcessorConfigBuilder};
pub use embedding::{Embedder, HashEmbedder, RigEmbedder};
pub use error::ProcessError;
pub use tagging::{CompletionTagger, KeywordTagger, Tagger, sanitize_tags};

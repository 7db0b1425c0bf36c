//! # Processor Configuration Module
//!
//! This module provides configuration structures and builders for the
//! processing stage of a crawl: chunk sizing, tag bounds and batch flushing.
//!
//! ## Key Components
//!
//! - `ChunkOptions`: Controls the chunking behavior
//! - `ProcessorConfig`: Complete configuration for chunking, tagging and batching
//! - `ProcessorConfigBuilder`: Builder pattern implementation for easier configuration

/// Configuration for chunking text
#[derive(Debug, Clone)]
pub struct ChunkOptions {
    /// Target size of each chunk in characters
    pub target_chunk_size: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            target_chunk_size: 512,
        }
    }
}

/// Configuration for the processor
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Options for chunking
    pub chunk_options: ChunkOptions,

    /// Pages buffered before the batch is indexed
    pub flush_threshold: usize,

    /// Maximum tags per page
    pub max_tags: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            chunk_options: ChunkOptions::default(),
            flush_threshold: 5,
            max_tags: 5,
        }
    }
}

/// Builder for ProcessorConfig
#[derive(Debug, Default)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ProcessorConfig::default(),
        }
    }

    /// Set the chunk options
    pub fn chunk_options(mut self, chunk_options: ChunkOptions) -> Self {
        self.config.chunk_options = chunk_options;
        self
    }

    /// Set the target chunk size
    pub fn target_chunk_size(mut self, target_chunk_size: usize) -> Self {
        self.config.chunk_options.target_chunk_size = target_chunk_size;
        self
    }

    /// Set the batch flush threshold
    pub fn flush_threshold(mut self, pages: usize) -> Self {
        self.config.flush_threshold = pages;
        self
    }

    /// Set the maximum tags per page
    pub fn max_tags(mut self, max_tags: usize) -> Self {
        self.config.max_tags = max_tags;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ProcessorConfig {
        self.config
    }
}

impl ProcessorConfig {
    /// Create a new builder
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::new()
    }
}

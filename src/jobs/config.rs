//! # Orchestrator Configuration Module
//!
//! Worker pool sizing and the crawl settings every job runs with.

use crate::crawler::CrawlerConfig;

/// Configuration for the crawl job orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Crawls running at the same time, one rendering session each
    pub workers: usize,

    /// Jobs waiting for a worker before new requests are refused
    pub queue_capacity: usize,

    /// Settings applied to every crawl
    pub crawler: CrawlerConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            queue_capacity: 64,
            crawler: CrawlerConfig::default(),
        }
    }
}

/// Builder for OrchestratorConfig
#[derive(Debug, Default)]
pub struct OrchestratorConfigBuilder {
    config: OrchestratorConfig,
}

impl OrchestratorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn crawler(mut self, crawler: CrawlerConfig) -> Self {
        self.config.crawler = crawler;
        self
    }

    pub fn build(self) -> OrchestratorConfig {
        self.config
    }
}

impl OrchestratorConfig {
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::new()
    }
}

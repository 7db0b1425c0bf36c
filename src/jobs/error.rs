//! Error types for the jobs module

use crate::crawler::CrawlError;
use crate::error::Error as CrateError;
use crate::index::DbError;
use thiserror::Error;

/// Error type for job orchestration
#[derive(Debug, Error)]
pub enum JobError {
    /// The admission queue is at capacity
    #[error("Crawl queue is full")]
    QueueFull,

    /// The orchestrator has been shut down
    #[error("Orchestrator is shut down")]
    ShutDown,

    /// No domain with this id
    #[error("Domain {0} not found")]
    DomainNotFound(i64),

    /// No job with this id
    #[error("Job {0} not found")]
    JobNotFound(i64),

    /// Job or domain record could not be read or written
    #[error("Job store error: {0}")]
    Store(#[from] DbError),

    /// The crawl itself failed
    #[error("Crawl failed: {0}")]
    Crawl(#[from] CrawlError),
}

impl From<JobError> for CrateError {
    fn from(err: JobError) -> Self {
        CrateError::Job(err.to_string())
    }
}

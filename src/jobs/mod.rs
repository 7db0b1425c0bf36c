//! # Crawl Jobs Module
//!
//! Job and domain records and the worker pool that runs crawls.
//!
//! A job moves `pending → running → {completed, failed}`. The [`Orchestrator`]
//! is the only component that writes job and domain records; crawl workers
//! report progress through a [`ProgressSink`](crate::crawler::ProgressSink)
//! bound to their job.

pub mod config;
pub mod error;
mod orchestrator;

pub use config::{OrchestratorConfig, OrchestratorConfigBuilder};
pub use error::JobError;
pub use orchestrator::Orchestrator;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::index::DbError;

/// Lifecycle of a crawl job; domains mirror the status of their latest job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Completed and failed jobs never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// One crawl run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlJob {
    pub id: i64,
    pub domain_id: i64,
    pub status: JobStatus,
    pub pages_scraped: usize,
    pub total_pages: usize,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A site being crawled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub id: i64,
    /// Root URL the crawl starts from
    pub url: String,
    pub status: JobStatus,
    pub pages_scraped: usize,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// What callers of [`Orchestrator::get_job_status`] see
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub status: JobStatus,
    pub pages_scraped: usize,
    pub total_pages: usize,
    pub error: Option<String>,
}

impl From<&CrawlJob> for JobStatusReport {
    fn from(job: &CrawlJob) -> Self {
        Self {
            status: job.status,
            pages_scraped: job.pages_scraped,
            total_pages: job.total_pages,
            error: job.error.clone(),
        }
    }
}

/// Persistence for job and domain records.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_domain(&self, url: &str) -> Result<Domain, DbError>;

    async fn get_domain(&self, id: i64) -> Result<Option<Domain>, DbError>;

    async fn list_domains(&self) -> Result<Vec<Domain>, DbError>;

    async fn update_domain(&self, domain: &Domain) -> Result<(), DbError>;

    /// Create a `pending` job for the domain.
    async fn create_job(&self, domain_id: i64) -> Result<CrawlJob, DbError>;

    async fn get_job(&self, id: i64) -> Result<Option<CrawlJob>, DbError>;

    async fn update_job(&self, job: &CrawlJob) -> Result<(), DbError>;

    /// Write the running page count to a job and its domain.
    async fn record_progress(
        &self,
        job_id: i64,
        domain_id: i64,
        pages_scraped: usize,
    ) -> Result<(), DbError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status)
            );
        }
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}

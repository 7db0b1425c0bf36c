//! Bounded worker pool running crawl jobs
//!
//! Requests enter a bounded FIFO queue. A fixed set of workers share its
//! receiver and each runs one crawl to completion before taking the next, so
//! there is never more than one rendering session per worker.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::crawler::{CrawlController, CrawlError, CrawlServices, ProgressSink, normalize_url};
use crate::jobs::{Domain, JobError, JobStatus, JobStatusReport, JobStore, OrchestratorConfig};

/// A queued crawl
#[derive(Debug)]
struct CrawlRequest {
    job_id: i64,
    domain_id: i64,
    url: String,
}

/// Writes crawl progress to the job and its domain
struct StoreProgress {
    store: Arc<dyn JobStore>,
    job_id: i64,
    domain_id: i64,
}

#[async_trait]
impl ProgressSink for StoreProgress {
    async fn report(&self, pages_scraped: usize) {
        if let Err(e) = self
            .store
            .record_progress(self.job_id, self.domain_id, pages_scraped)
            .await
        {
            warn!(job_id = self.job_id, error = %e, "Failed to record progress");
        }
    }
}

struct Worker {
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<CrawlRequest>>>,
    controller: Arc<CrawlController>,
    store: Arc<dyn JobStore>,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.id, "Worker started");
        loop {
            let request = {
                let mut receiver = self.receiver.lock().await;
                receiver.recv().await
            };
            let Some(request) = request else {
                break;
            };
            let job_id = request.job_id;
            if let Err(e) = self.run_job(request).await {
                error!(worker = self.id, job_id, error = %e, "Job bookkeeping failed");
                self.fail_job(job_id, &e).await;
            }
        }
        debug!(worker = self.id, "Worker stopped");
    }

    /// Best-effort move of a job that could not be run or recorded to `failed`.
    async fn fail_job(&self, job_id: i64, cause: &JobError) {
        let mut job = match self.store.get_job(job_id).await {
            Ok(Some(job)) if !job.status.is_terminal() => job,
            Ok(_) => return,
            Err(e) => {
                warn!(job_id, error = %e, "Failed to load job for failure update");
                return;
            }
        };
        job.status = JobStatus::Failed;
        job.error = Some(cause.to_string());
        job.completed_at = Some(Utc::now());
        if let Err(e) = self.store.update_job(&job).await {
            warn!(job_id, error = %e, "Failed to mark job failed");
        }
    }

    #[instrument(skip(self, request), fields(worker = self.id, job_id = request.job_id, domain_id = request.domain_id))]
    async fn run_job(&self, request: CrawlRequest) -> Result<(), JobError> {
        let mut job = self
            .store
            .get_job(request.job_id)
            .await?
            .ok_or(JobError::JobNotFound(request.job_id))?;
        let mut domain = self
            .store
            .get_domain(request.domain_id)
            .await?
            .ok_or(JobError::DomainNotFound(request.domain_id))?;

        job.status = JobStatus::Running;
        self.store.update_job(&job).await?;
        domain.status = JobStatus::Running;
        self.store.update_domain(&domain).await?;
        info!(url = %request.url, "Crawl started");

        let progress = StoreProgress {
            store: Arc::clone(&self.store),
            job_id: job.id,
            domain_id: domain.id,
        };
        let result = self
            .controller
            .run(&request.url, domain.id, &progress)
            .await;

        let now = Utc::now();
        let pages = match &result {
            Ok(outcome) => outcome.pages.len(),
            Err(e) => e.pages_scraped().unwrap_or(0),
        };
        job.pages_scraped = pages;
        job.total_pages = pages;
        job.completed_at = Some(now);
        domain.pages_scraped = pages;
        domain.last_scraped_at = Some(now);

        match result {
            Ok(outcome) => {
                job.status = JobStatus::Completed;
                domain.status = JobStatus::Completed;
                info!(
                    pages,
                    documents = outcome.index.documents,
                    "Crawl completed"
                );
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                job.error = Some(e.to_string());
                domain.status = JobStatus::Failed;
                error!(pages, error = %e, "Crawl failed");
            }
        }

        self.store.update_job(&job).await?;
        self.store.update_domain(&domain).await?;
        Ok(())
    }
}

/// Accepts crawl requests and runs them on a fixed worker pool
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    sender: Mutex<Option<mpsc::Sender<CrawlRequest>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Spawn the workers. Must be called inside a tokio runtime.
    pub fn start(
        services: CrawlServices,
        store: Arc<dyn JobStore>,
        config: OrchestratorConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let controller = Arc::new(CrawlController::new(services, config.crawler));

        let workers = (0..config.workers.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    receiver: Arc::clone(&receiver),
                    controller: Arc::clone(&controller),
                    store: Arc::clone(&store),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(
            workers = config.workers.max(1),
            queue_capacity = config.queue_capacity.max(1),
            "Orchestrator started"
        );
        Self {
            store,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Record a new site to crawl.
    pub async fn register_domain(&self, url: &str) -> Result<Domain, JobError> {
        if normalize_url(url).is_none() {
            return Err(CrawlError::InvalidStartUrl(url.to_string()).into());
        }
        Ok(self.store.create_domain(url.trim()).await?)
    }

    /// Queue a crawl of `url` for the domain and return the new job id.
    ///
    /// The job is persisted as `pending` first. When the queue is full, or the
    /// orchestrator has shut down, the job is marked `failed` and an error returned.
    #[instrument(skip(self))]
    pub async fn start_crawl(&self, domain_id: i64, url: &str) -> Result<i64, JobError> {
        if self.store.get_domain(domain_id).await?.is_none() {
            return Err(JobError::DomainNotFound(domain_id));
        }
        let job = self.store.create_job(domain_id).await?;
        let request = CrawlRequest {
            job_id: job.id,
            domain_id,
            url: url.trim().to_string(),
        };

        let refusal = {
            let sender = self.sender.lock().await;
            match sender.as_ref().map(|sender| sender.try_send(request)) {
                Some(Ok(())) => None,
                Some(Err(TrySendError::Full(_))) => Some((JobError::QueueFull, "queue full")),
                Some(Err(TrySendError::Closed(_))) | None => {
                    Some((JobError::ShutDown, "orchestrator shut down"))
                }
            }
        };

        match refusal {
            None => {
                debug!(job_id = job.id, "Crawl queued");
                Ok(job.id)
            }
            Some((err, reason)) => {
                warn!(job_id = job.id, reason, "Crawl refused");
                let mut job = job;
                job.status = JobStatus::Failed;
                job.error = Some(reason.to_string());
                job.completed_at = Some(Utc::now());
                self.store.update_job(&job).await?;
                Err(err)
            }
        }
    }

    pub async fn get_job_status(&self, job_id: i64) -> Result<JobStatusReport, JobError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(JobError::JobNotFound(job_id))?;
        Ok(JobStatusReport::from(&job))
    }

    /// Stop accepting crawls and wait for queued ones to finish.
    pub async fn shutdown(&self) {
        self.sender.lock().await.take();
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for result in future::join_all(workers).await {
            if let Err(e) = result {
                error!(error = %e, "Worker task failed");
            }
        }
        info!("Orchestrator stopped");
    }
}

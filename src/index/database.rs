//! Database operations for the index module

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Row, Value, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, instrument};

use crate::crawler::{PageStore, ScrapedPage};
use crate::index::error::DbError;
use crate::index::schema;
use crate::index::{DocumentIndex, IndexDocument, IndexSchema};
use crate::jobs::{CrawlJob, Domain, JobStatus, JobStore};
use crate::media::MediaKind;
use crate::model::embedding::{blob_to_vector, vector_to_blob};

/// One page of a paginated page listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageListing {
    pub pages: Vec<ScrapedPage>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

/// Database manager for crawl records and document indexes
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

fn now_ts() -> i64 {
    Utc::now().timestamp()
}

fn to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn column_i64(row: &Row, idx: i32) -> Result<i64, DbError> {
    row.get::<i64>(idx)
        .map_err(|e| DbError::Data(format!("Failed to read column {}: {}", idx, e)))
}

fn column_text(row: &Row, idx: i32) -> Result<String, DbError> {
    row.get::<String>(idx)
        .map_err(|e| DbError::Data(format!("Failed to read column {}: {}", idx, e)))
}

fn column_opt_i64(row: &Row, idx: i32) -> Result<Option<i64>, DbError> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(v) => Ok(Some(v)),
        other => Err(DbError::Data(format!(
            "Expected integer in column {}, got {:?}",
            idx, other
        ))),
    }
}

fn column_opt_text(row: &Row, idx: i32) -> Result<Option<String>, DbError> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(v) => Ok(Some(v)),
        other => Err(DbError::Data(format!(
            "Expected text in column {}, got {:?}",
            idx, other
        ))),
    }
}

fn column_status(row: &Row, idx: i32) -> Result<JobStatus, DbError> {
    column_text(row, idx)?.parse().map_err(DbError::Data)
}

impl Database {
    /// Create a new database manager
    #[instrument(skip(conn))]
    pub async fn new(conn: Connection) -> Result<Self, DbError> {
        schema::initialize_schema(&conn).await?;

        Ok(Self { conn })
    }

    /// Open (or create) a database file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let db = libsql::Builder::new_local(path.as_ref())
            .build()
            .await
            .map_err(|e| DbError::Connection(format!("Failed to open database: {}", e)))?;

        let conn = db
            .connect()
            .map_err(|e| DbError::Connection(format!("Failed to connect to database: {}", e)))?;

        Self::new(conn).await
    }

    /// Private database that lives as long as this manager and its clones
    pub async fn open_in_memory() -> Result<Self, DbError> {
        Self::open(":memory:").await
    }

    /// Run an insert ending in `RETURNING id` and return the id
    async fn insert_returning_id<P>(&self, sql: &str, params: P, what: &str) -> Result<i64, DbError>
    where
        P: libsql::params::IntoParams,
    {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| DbError::Query(format!("Failed to insert {}: {}", what, e)))?;

        match rows.next().await {
            Ok(Some(row)) => column_i64(&row, 0),
            Ok(None) => Err(DbError::Data(format!("No id returned for {}", what))),
            Err(e) => Err(DbError::Data(format!("Failed to read {} id: {}", what, e))),
        }
    }

    async fn count<P>(&self, sql: &str, params: P) -> Result<usize, DbError>
    where
        P: libsql::params::IntoParams,
    {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| DbError::Query(format!("Failed to count rows: {}", e)))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(column_i64(&row, 0)?.max(0) as usize),
            Ok(None) => Ok(0),
            Err(e) => Err(DbError::Data(format!("Failed to count rows: {}", e))),
        }
    }

    fn row_to_domain(&self, row: &Row) -> Result<Domain, DbError> {
        Ok(Domain {
            id: column_i64(row, 0)?,
            url: column_text(row, 1)?,
            status: column_status(row, 2)?,
            pages_scraped: column_i64(row, 3)?.max(0) as usize,
            last_scraped_at: column_opt_i64(row, 4)?.map(to_datetime),
            created_at: to_datetime(column_i64(row, 5)?),
        })
    }

    fn row_to_job(&self, row: &Row) -> Result<CrawlJob, DbError> {
        Ok(CrawlJob {
            id: column_i64(row, 0)?,
            domain_id: column_i64(row, 1)?,
            status: column_status(row, 2)?,
            pages_scraped: column_i64(row, 3)?.max(0) as usize,
            total_pages: column_i64(row, 4)?.max(0) as usize,
            error: column_opt_text(row, 5)?,
            created_at: to_datetime(column_i64(row, 6)?),
            completed_at: column_opt_i64(row, 7)?.map(to_datetime),
        })
    }

    fn row_to_page(&self, row: &Row) -> Result<ScrapedPage, DbError> {
        Ok(ScrapedPage {
            id: column_i64(row, 0)?,
            domain_id: column_i64(row, 1)?,
            url: column_text(row, 2)?,
            title: column_text(row, 3)?,
            content: column_text(row, 4)?,
            content_preview: column_text(row, 5)?,
            word_count: column_i64(row, 6)?.max(0) as usize,
            tags: serde_json::from_str(&column_text(row, 7)?)?,
            media_refs: serde_json::from_str(&column_text(row, 8)?)?,
            transcriptions: serde_json::from_str(&column_text(row, 9)?)?,
            last_updated: to_datetime(column_i64(row, 10)?),
        })
    }

    fn row_to_document(&self, row: &Row) -> Result<IndexDocument, DbError> {
        let media_kind = column_opt_text(row, 6)?
            .map(|kind| {
                MediaKind::parse(&kind)
                    .ok_or_else(|| DbError::Data(format!("Unknown media kind: {}", kind)))
            })
            .transpose()?;
        let media_url = column_text(row, 7)?;
        let embedding: Vec<u8> = row
            .get(8)
            .map_err(|e| DbError::Data(format!("Failed to read embedding: {}", e)))?;

        Ok(IndexDocument {
            url: column_text(row, 0)?,
            title: column_text(row, 1)?,
            content: column_text(row, 2)?,
            chunk_index: column_i64(row, 3)?.max(0) as usize,
            domain_id: column_i64(row, 4)?,
            tags: serde_json::from_str(&column_text(row, 5)?)?,
            media_kind,
            media_url: (!media_url.is_empty()).then_some(media_url),
            embedding: blob_to_vector(&embedding),
        })
    }

    /// Table and vector width of a registered index
    async fn index_table(&self, index_name: &str) -> Result<(String, usize), DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT table_name, dimensions FROM document_indexes WHERE name = ?",
                params![index_name],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to look up index: {}", e)))?;

        match rows.next().await {
            Ok(Some(row)) => Ok((column_text(&row, 0)?, column_i64(&row, 1)?.max(0) as usize)),
            Ok(None) => Err(DbError::InvalidDocument(format!(
                "index {} does not exist",
                index_name
            ))),
            Err(e) => Err(DbError::Data(format!("Failed to look up index: {}", e))),
        }
    }

    /// Pages of a domain in crawl order, `per_page` at a time starting at page 1
    #[instrument(skip(self))]
    pub async fn list_pages(
        &self,
        domain_id: i64,
        page: usize,
        per_page: usize,
    ) -> Result<PageListing, DbError> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let total = self
            .count(
                "SELECT COUNT(*) FROM pages WHERE domain_id = ?",
                params![domain_id],
            )
            .await?;

        let mut rows = self
            .conn
            .query(
                "SELECT id, domain_id, url, title, content, content_preview, word_count,
                        tags, media_refs, transcriptions, last_updated
                 FROM pages WHERE domain_id = ? ORDER BY id LIMIT ? OFFSET ?",
                params![
                    domain_id,
                    per_page as i64,
                    ((page - 1) * per_page) as i64
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to list pages: {}", e)))?;

        let mut pages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            pages.push(self.row_to_page(&row)?);
        }

        Ok(PageListing {
            pages,
            total,
            page,
            per_page,
            total_pages: total.div_ceil(per_page),
        })
    }

    /// Number of documents stored in an index
    pub async fn count_documents(&self, index_name: &str) -> Result<usize, DbError> {
        let (table, _) = self.index_table(index_name).await?;
        self.count(&format!("SELECT COUNT(*) FROM {}", table), params![])
            .await
    }

    /// Every document in an index, ordered by url, media url and chunk
    pub async fn list_documents(&self, index_name: &str) -> Result<Vec<IndexDocument>, DbError> {
        let (table, _) = self.index_table(index_name).await?;
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT url, title, content, chunk_index, domain_id, tags, media_kind,
                            media_url, embedding
                     FROM {} ORDER BY url, media_url, chunk_index",
                    table
                ),
                params![],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to list documents: {}", e)))?;

        let mut documents = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            documents.push(self.row_to_document(&row)?);
        }
        Ok(documents)
    }
}

#[async_trait]
impl DocumentIndex for Database {
    #[instrument(skip(self))]
    async fn ensure_index(&self, index_name: &str, schema: &IndexSchema) -> Result<(), DbError> {
        let table = schema::document_table_name(index_name)?;

        if let Ok((_, dimensions)) = self.index_table(index_name).await {
            if dimensions != schema.dimensions {
                return Err(DbError::InvalidDocument(format!(
                    "index {} has {} dimensions, not {}",
                    index_name, dimensions, schema.dimensions
                )));
            }
            return Ok(());
        }

        schema::create_document_table(&self.conn, &table, schema.dimensions).await?;
        self.conn
            .execute(
                "INSERT INTO document_indexes (name, table_name, dimensions) VALUES (?, ?, ?)
                 ON CONFLICT(name) DO NOTHING",
                params![index_name, table.as_str(), schema.dimensions as i64],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to register index: {}", e)))?;

        debug!(index_name, table, "Created document index");
        Ok(())
    }

    async fn upsert(&self, index_name: &str, document: &IndexDocument) -> Result<(), DbError> {
        let (table, dimensions) = self.index_table(index_name).await?;
        if document.embedding.len() != dimensions {
            return Err(DbError::InvalidDocument(format!(
                "embedding has {} dimensions, index {} expects {}",
                document.embedding.len(),
                index_name,
                dimensions
            )));
        }

        self.conn
            .execute(
                &format!(
                    "INSERT INTO {} (url, title, content, chunk_index, domain_id, tags, media_kind,
                                     media_url, embedding, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(url, chunk_index, media_url) DO UPDATE SET
                     title = excluded.title,
                     content = excluded.content,
                     domain_id = excluded.domain_id,
                     tags = excluded.tags,
                     media_kind = excluded.media_kind,
                     embedding = excluded.embedding,
                     updated_at = excluded.updated_at",
                    table
                ),
                params![
                    document.url.as_str(),
                    document.title.as_str(),
                    document.content.as_str(),
                    document.chunk_index as i64,
                    document.domain_id,
                    serde_json::to_string(&document.tags)?,
                    document.media_kind.map(|kind| kind.as_str().to_string()),
                    document.media_url.clone().unwrap_or_default(),
                    Value::Blob(vector_to_blob(&document.embedding)),
                    now_ts(),
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to upsert document: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl PageStore for Database {
    #[instrument(skip(self, page), fields(url = %page.url))]
    async fn insert_page(&self, page: &ScrapedPage) -> Result<i64, DbError> {
        self.insert_returning_id(
            "INSERT INTO pages (domain_id, url, title, content, content_preview, word_count,
                                tags, media_refs, transcriptions, last_updated)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
            params![
                page.domain_id,
                page.url.as_str(),
                page.title.as_str(),
                page.content.as_str(),
                page.content_preview.as_str(),
                page.word_count as i64,
                serde_json::to_string(&page.tags)?,
                serde_json::to_string(&page.media_refs)?,
                serde_json::to_string(&page.transcriptions)?,
                page.last_updated.timestamp(),
            ],
            "page",
        )
        .await
    }
}

#[async_trait]
impl JobStore for Database {
    async fn create_domain(&self, url: &str) -> Result<Domain, DbError> {
        let created_at = now_ts();
        let id = self
            .insert_returning_id(
                "INSERT INTO domains (url, status, pages_scraped, created_at)
                 VALUES (?, ?, 0, ?) RETURNING id",
                params![url, JobStatus::Pending.as_str(), created_at],
                "domain",
            )
            .await?;

        Ok(Domain {
            id,
            url: url.to_string(),
            status: JobStatus::Pending,
            pages_scraped: 0,
            last_scraped_at: None,
            created_at: to_datetime(created_at),
        })
    }

    async fn get_domain(&self, id: i64) -> Result<Option<Domain>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, url, status, pages_scraped, last_scraped_at, created_at
                 FROM domains WHERE id = ?",
                params![id],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to get domain: {}", e)))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(self.row_to_domain(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DbError::Data(format!("Failed to get domain: {}", e))),
        }
    }

    async fn list_domains(&self) -> Result<Vec<Domain>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, url, status, pages_scraped, last_scraped_at, created_at
                 FROM domains ORDER BY id",
                params![],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to list domains: {}", e)))?;

        let mut domains = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            domains.push(self.row_to_domain(&row)?);
        }
        Ok(domains)
    }

    async fn update_domain(&self, domain: &Domain) -> Result<(), DbError> {
        self.conn
            .execute(
                "UPDATE domains SET url = ?, status = ?, pages_scraped = ?, last_scraped_at = ?
                 WHERE id = ?",
                params![
                    domain.url.as_str(),
                    domain.status.as_str(),
                    domain.pages_scraped as i64,
                    domain.last_scraped_at.map(|at| at.timestamp()),
                    domain.id,
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to update domain: {}", e)))?;
        Ok(())
    }

    async fn create_job(&self, domain_id: i64) -> Result<CrawlJob, DbError> {
        let created_at = now_ts();
        let id = self
            .insert_returning_id(
                "INSERT INTO crawl_jobs (domain_id, status, pages_scraped, total_pages, created_at)
                 VALUES (?, ?, 0, 0, ?) RETURNING id",
                params![domain_id, JobStatus::Pending.as_str(), created_at],
                "crawl job",
            )
            .await?;

        Ok(CrawlJob {
            id,
            domain_id,
            status: JobStatus::Pending,
            pages_scraped: 0,
            total_pages: 0,
            error: None,
            created_at: to_datetime(created_at),
            completed_at: None,
        })
    }

    async fn get_job(&self, id: i64) -> Result<Option<CrawlJob>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, domain_id, status, pages_scraped, total_pages, error, created_at,
                        completed_at
                 FROM crawl_jobs WHERE id = ?",
                params![id],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to get job: {}", e)))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(self.row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DbError::Data(format!("Failed to get job: {}", e))),
        }
    }

    async fn update_job(&self, job: &CrawlJob) -> Result<(), DbError> {
        self.conn
            .execute(
                "UPDATE crawl_jobs SET status = ?, pages_scraped = ?, total_pages = ?, error = ?,
                        completed_at = ?
                 WHERE id = ?",
                params![
                    job.status.as_str(),
                    job.pages_scraped as i64,
                    job.total_pages as i64,
                    job.error.clone(),
                    job.completed_at.map(|at| at.timestamp()),
                    job.id,
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to update job: {}", e)))?;
        Ok(())
    }

    async fn record_progress(
        &self,
        job_id: i64,
        domain_id: i64,
        pages_scraped: usize,
    ) -> Result<(), DbError> {
        let pages = pages_scraped as i64;
        self.conn
            .execute(
                "UPDATE crawl_jobs SET pages_scraped = ? WHERE id = ?",
                params![pages, job_id],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to record job progress: {}", e)))?;
        self.conn
            .execute(
                "UPDATE domains SET pages_scraped = ? WHERE id = ?",
                params![pages, domain_id],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to record domain progress: {}", e)))?;
        Ok(())
    }
}

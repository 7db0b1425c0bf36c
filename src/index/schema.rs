//! # Database Schema Module
//!
//! Table definitions for crawl bookkeeping (`domains`, `crawl_jobs`, `pages`),
//! the registry of document indexes, and the per-index document tables.
//!
//! Each document index is its own table so that its `F32_BLOB` column can be
//! sized to the embedder in use. Tag, media and transcript lists on pages are
//! stored as JSON text.

use crate::index::error::DbError;
use libsql::{Connection, params};
use tracing::warn;

const MAX_INDEX_NAME_LEN: usize = 48;

/// Initialize the database schema
pub async fn initialize_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS domains (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            pages_scraped INTEGER NOT NULL DEFAULT 0,
            last_scraped_at INTEGER,
            created_at INTEGER NOT NULL
        )",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create domains table: {}", e)))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS crawl_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            domain_id INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            pages_scraped INTEGER NOT NULL DEFAULT 0,
            total_pages INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            created_at INTEGER NOT NULL,
            completed_at INTEGER,
            FOREIGN KEY (domain_id) REFERENCES domains(id) ON DELETE CASCADE
        )",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create crawl_jobs table: {}", e)))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            domain_id INTEGER NOT NULL,
            url TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            content_preview TEXT NOT NULL,
            word_count INTEGER NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            media_refs TEXT NOT NULL DEFAULT '[]',
            transcriptions TEXT NOT NULL DEFAULT '[]',
            last_updated INTEGER NOT NULL,
            FOREIGN KEY (domain_id) REFERENCES domains(id) ON DELETE CASCADE
        )",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create pages table: {}", e)))?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pages_domain_id ON pages(domain_id)",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create index on pages: {}", e)))?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_crawl_jobs_domain_id ON crawl_jobs(domain_id)",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create index on crawl_jobs: {}", e)))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS document_indexes (
            name TEXT PRIMARY KEY,
            table_name TEXT NOT NULL UNIQUE,
            dimensions INTEGER NOT NULL
        )",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create document_indexes table: {}", e)))?;

    Ok(())
}

/// Table holding the documents of `index_name`.
///
/// Names are lowercased and every character outside `[a-z0-9]` becomes `_`.
pub fn document_table_name(index_name: &str) -> Result<String, DbError> {
    let cleaned: String = index_name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.is_empty() || cleaned.len() > MAX_INDEX_NAME_LEN {
        return Err(DbError::InvalidDocument(format!(
            "index name must be 1-{} characters: {:?}",
            MAX_INDEX_NAME_LEN, index_name
        )));
    }
    Ok(format!("idx_{}", cleaned))
}

/// Create the document table for an index with `dimensions`-wide vectors.
pub async fn create_document_table(
    conn: &Connection,
    table: &str,
    dimensions: usize,
) -> Result<(), DbError> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                domain_id INTEGER NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                media_kind TEXT,
                media_url TEXT NOT NULL DEFAULT '',
                embedding F32_BLOB({dimensions}) NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (url, chunk_index, media_url)
            )"
        ),
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create {} table: {}", table, e)))?;

    // Needs the libsql vector extension; documents remain usable without it.
    if let Err(e) = conn
        .execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS {table}_vec ON {table} (libsql_vector_idx(embedding))"
            ),
            params![],
        )
        .await
    {
        warn!(table, error = %e, "Failed to create vector index; similarity search unavailable");
    }

    Ok(())
}

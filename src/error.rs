//! Error types for the siteindex crate

use thiserror::Error;

/// Result type for siteindex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for siteindex operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem or process error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration or arguments
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Rendering session error
    #[error("Render error: {0}")]
    Render(String),

    /// Web crawling error
    #[error("Crawl error: {0}")]
    Crawl(String),

    /// Media download or transcription error
    #[error("Media error: {0}")]
    Media(String),

    /// Content processing error
    #[error("Process error: {0}")]
    Process(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Crawl job error
    #[error("Job error: {0}")]
    Job(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

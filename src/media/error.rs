//! Error types for the media module

use std::time::Duration;

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for media download and transcription
#[derive(Debug, Error)]
pub enum MediaError {
    /// Filesystem error while staging audio
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An external tool exited unsuccessfully
    #[error("{tool} failed: {message}")]
    Tool {
        /// Program name
        tool: String,
        /// Captured stderr or exit status
        message: String,
    },

    /// An external tool ran past its budget
    #[error("{tool} timed out after {timeout:?}")]
    Timeout {
        /// Program name
        tool: String,
        /// Budget that was exceeded
        timeout: Duration,
    },

    /// The download finished but produced no audio file
    #[error("No audio produced for {0}")]
    MissingAudio(String),

    /// Tool output could not be understood
    #[error("Unexpected tool output: {0}")]
    Parse(String),

    /// Speech-to-text failure
    #[error("Transcription error: {0}")]
    Transcription(String),
}

impl From<MediaError> for CrateError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Io(e) => CrateError::Io(e),
            _ => CrateError::Media(err.to_string()),
        }
    }
}

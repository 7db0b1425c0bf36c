//! Error types for the render module

use std::time::Duration;

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for rendering operations
#[derive(Debug, Error)]
pub enum RenderError {
    /// The renderer process died or its session became invalid
    #[error("Renderer crashed: {0}")]
    Crashed(String),

    /// The page did not finish loading within the budget
    #[error("Render timed out after {0:?}")]
    Timeout(Duration),

    /// The remote host refused or could not be reached
    #[error("Connection refused: {0}")]
    Refused(String),

    /// The remote host answered with a rate-limit status
    #[error("Rate limited with HTTP {0}")]
    RateLimited(u16),

    /// The server answered with a non-success status
    #[error("HTTP status {0}")]
    Status(u16),

    /// A renderer could not be launched at all
    #[error("Failed to launch renderer: {0}")]
    Launch(String),

    /// The session was used before it was started or after it was closed
    #[error("Render session is not ready: {0}")]
    NotReady(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl RenderError {
    /// Classify a free-form driver error message.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if [
            "invalid session",
            "session deleted",
            "disconnected",
            "target closed",
            "crashed",
            "channel closed",
            "receiver is gone",
        ]
        .iter()
        .any(|sig| lower.contains(sig))
            || (lower.contains("renderer") && lower.contains("timeout"))
        {
            Self::Crashed(message)
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout(Duration::ZERO)
        } else if lower.contains("refused") || lower.contains("unreachable") {
            Self::Refused(message)
        } else if lower.contains("429") {
            Self::RateLimited(429)
        } else if lower.contains("403") || lower.contains("forbidden") {
            Self::Status(403)
        } else {
            Self::Other(message)
        }
    }

    /// Whether the error means the renderer itself must be restarted
    pub fn is_crash(&self) -> bool {
        matches!(self, Self::Crashed(_))
    }

    /// Whether the error is a network-level condition worth retrying later
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Refused(_) | Self::RateLimited(_) => true,
            Self::Status(code) => matches!(code, 403 | 408) || *code >= 500,
            _ => false,
        }
    }

    /// Whether retrying the same URL cannot succeed (client errors other than 403/408/429)
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Status(code) if (400..500).contains(code) && !matches!(code, 403 | 408 | 429))
    }
}

impl From<RenderError> for CrateError {
    fn from(err: RenderError) -> Self {
        CrateError::Render(err.to_string())
    }
}

impl From<reqwest::Error> for RenderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(Duration::ZERO)
        } else if err.is_connect() {
            Self::Refused(err.to_string())
        } else if let Some(status) = err.status() {
            match status.as_u16() {
                429 => Self::RateLimited(429),
                code => Self::Status(code),
            }
        } else {
            Self::Other(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_crash_signatures() {
        assert!(RenderError::classify("invalid session id").is_crash());
        assert!(RenderError::classify("Renderer disconnected").is_crash());
        assert!(RenderError::classify("timeout: Timed out receiving message from renderer").is_crash());
        assert!(!RenderError::classify("net::ERR_CONNECTION_REFUSED").is_crash());
    }

    #[test]
    fn test_classify_transient() {
        assert!(RenderError::classify("operation timed out").is_transient());
        assert!(RenderError::classify("connection refused").is_transient());
        assert!(RenderError::classify("HTTP 429 Too Many Requests").is_transient());
        assert!(!RenderError::classify("something odd").is_transient());
        assert!(RenderError::classify("HTTP 403 Forbidden").is_transient());
    }

    #[test]
    fn test_status_classes() {
        for code in [403, 408, 500, 502, 503] {
            let err = RenderError::Status(code);
            assert!(err.is_transient(), "{code}");
            assert!(!err.is_permanent(), "{code}");
        }
        for code in [400, 404, 410] {
            let err = RenderError::Status(code);
            assert!(err.is_permanent(), "{code}");
            assert!(!err.is_transient(), "{code}");
        }
        assert!(!RenderError::Timeout(Duration::ZERO).is_permanent());
    }
}

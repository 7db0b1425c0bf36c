//! Detection of anti-bot and blocking pages

use std::fmt;
use std::sync::Arc;

use crate::render::RenderedPage;

/// Keyword pairs that together signal a challenge or block page.
const DEFAULT_SIGNATURES: [(&str, &str); 5] = [
    ("access denied", "forbidden"),
    ("cloudflare", "checking your browser"),
    ("please complete the security check", "captcha"),
    ("blocked", "firewall"),
    ("attention required", "cloudflare"),
];

/// Characters of markup inspected by the pattern detector.
pub const DEFAULT_SAMPLE_LEN: usize = 2000;

/// Strategy deciding whether a rendered page is a block page
#[derive(Clone)]
pub enum BlockDetector {
    /// Every keyword of any one pattern appears in the lowercased markup prefix
    PatternBased {
        patterns: Vec<Vec<String>>,
        sample_len: usize,
    },
    /// The main document status is one of `codes`
    StatusCodeBased { codes: Vec<u16> },
    /// Caller-supplied predicate
    Custom(Arc<dyn Fn(&RenderedPage) -> bool + Send + Sync>),
}

impl BlockDetector {
    /// Pattern detector with the built-in signatures
    pub fn default_patterns() -> Self {
        Self::PatternBased {
            patterns: DEFAULT_SIGNATURES
                .iter()
                .map(|(a, b)| vec![a.to_string(), b.to_string()])
                .collect(),
            sample_len: DEFAULT_SAMPLE_LEN,
        }
    }

    /// Status detector for 403 and 429
    pub fn default_status_codes() -> Self {
        Self::StatusCodeBased {
            codes: vec![403, 429],
        }
    }

    pub fn custom(predicate: impl Fn(&RenderedPage) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(predicate))
    }

    pub fn is_blocked(&self, page: &RenderedPage) -> bool {
        match self {
            Self::PatternBased {
                patterns,
                sample_len,
            } => {
                let sample: String = page.html.chars().take(*sample_len).collect::<String>().to_lowercase();
                patterns
                    .iter()
                    .filter(|keywords| !keywords.is_empty())
                    .any(|keywords| keywords.iter().all(|k| sample.contains(k.as_str())))
            }
            Self::StatusCodeBased { codes } => page.status.is_some_and(|s| codes.contains(&s)),
            Self::Custom(predicate) => predicate(page),
        }
    }
}

impl Default for BlockDetector {
    fn default() -> Self {
        Self::default_patterns()
    }
}

impl fmt::Debug for BlockDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PatternBased {
                patterns,
                sample_len,
            } => f
                .debug_struct("PatternBased")
                .field("patterns", &patterns.len())
                .field("sample_len", sample_len)
                .finish(),
            Self::StatusCodeBased { codes } => {
                f.debug_struct("StatusCodeBased").field("codes", codes).finish()
            }
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

//! # LLM Client Module
//!
//! A client pairing a completion model (used for tagging) with an embedding
//! model (used for indexing), both wrapped in governor rate limiters so a
//! long crawl cannot exhaust the provider quota.
//!
//! ## Key Components
//!
//! - `Client`: completion and embedding model pair
//! - `RateLimitedCompletionModel` / `RateLimitedEmbeddingModel`: limiter wrappers
//! - `embedding`: conversions between rig embeddings, `Vec<f32>` and libsql blobs

use rig::{completion::CompletionModel, embeddings::EmbeddingModel, providers::gemini};

pub mod embedding;
#[cfg(test)]
pub mod mock_model;
pub mod ratelimited;

pub use embedding::EmbeddingConversion;
pub use ratelimited::{RateLimitedCompletionModel, RateLimitedEmbeddingModel};

use crate::error::{Error, Result};

/// Environment variable holding the Gemini API key
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Provider quota tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tier {
    #[default]
    Standard,
    Free,
}

impl Tier {
    fn completion_per_minute(self) -> u32 {
        match self {
            Tier::Standard => 2000,
            Tier::Free => 30,
        }
    }

    fn embedding_per_minute(self) -> u32 {
        1000
    }

    fn completion_model(self) -> &'static str {
        match self {
            Tier::Standard => "gemini-2.0-flash",
            Tier::Free => "gemini-2.0-flash-lite",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Client<C, E>
where
    C: CompletionModel,
    E: EmbeddingModel,
{
    completion_model: C,
    embedding_model: E,
}

/// Rate-limited Gemini models
pub type GeminiClient = Client<
    RateLimitedCompletionModel<gemini::completion::CompletionModel>,
    RateLimitedEmbeddingModel<gemini::embedding::EmbeddingModel>,
>;

impl GeminiClient {
    /// Build from `GEMINI_API_KEY`
    pub fn gemini_from_env(tier: Tier) -> Result<Self> {
        let api_key = std::env::var(GEMINI_API_KEY_ENV)
            .map_err(|_| Error::Config(format!("{} must be set", GEMINI_API_KEY_ENV)))?;
        Ok(Self::gemini(&api_key, tier))
    }

    pub fn gemini(api_key: &str, tier: Tier) -> Self {
        let gemini_client = gemini::Client::new(api_key);
        let completion_model = RateLimitedCompletionModel::new(
            gemini_client.completion_model(tier.completion_model()),
            ratelimited::per_minute(tier.completion_per_minute()),
        );
        let embedding_model = RateLimitedEmbeddingModel::new(
            gemini_client.embedding_model(gemini::embedding::EMBEDDING_004),
            ratelimited::per_minute(tier.embedding_per_minute()),
        );
        Self {
            completion_model,
            embedding_model,
        }
    }
}

impl<C, E> Client<C, E>
where
    C: CompletionModel,
    E: EmbeddingModel,
{
    pub fn new(completion_model: C, embedding_model: E) -> Self {
        Self {
            completion_model,
            embedding_model,
        }
    }

    pub fn completion(&self) -> &C {
        &self.completion_model
    }

    pub fn embedding(&self) -> &E {
        &self.embedding_model
    }
}

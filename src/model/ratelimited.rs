//! governor-limited wrappers around rig models

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rig::{
    completion::{self, CompletionError, CompletionModel, CompletionRequest, CompletionResponse},
    embeddings::{Embedding, EmbeddingError, EmbeddingModel},
};
use tracing::{Instrument, debug_span, info_span};

/// Direct limiter allowing `per_minute` calls per minute, at least one
pub fn per_minute(per_minute: u32) -> DefaultDirectRateLimiter {
    let quota = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_minute(quota))
}

/// Raw provider response passed through the completion wrapper
pub struct RateLimitResponse<T> {
    pub response: T,
}

#[derive(Clone)]
pub struct RateLimitedCompletionModel<M: CompletionModel> {
    model: M,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl<M> RateLimitedCompletionModel<M>
where
    M: CompletionModel,
{
    pub fn new(model: M, limiter: DefaultDirectRateLimiter) -> Self {
        Self {
            model,
            limiter: Arc::new(limiter),
        }
    }
}

impl<M: CompletionModel> CompletionModel for RateLimitedCompletionModel<M> {
    type Response = RateLimitResponse<M::Response>;

    async fn completion(
        &self,
        request: CompletionRequest,
    ) -> Result<completion::CompletionResponse<Self::Response>, CompletionError> {
        self.limiter
            .until_ready()
            .instrument(debug_span!("limiter"))
            .await;
        let response = self
            .model
            .completion(request)
            .instrument(info_span!("completion"))
            .await?;
        Ok(CompletionResponse {
            choice: response.choice,
            raw_response: RateLimitResponse {
                response: response.raw_response,
            },
        })
    }
}

#[derive(Clone)]
pub struct RateLimitedEmbeddingModel<M: EmbeddingModel> {
    model: M,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl<M> RateLimitedEmbeddingModel<M>
where
    M: EmbeddingModel,
{
    pub fn new(model: M, limiter: DefaultDirectRateLimiter) -> Self {
        Self {
            model,
            limiter: Arc::new(limiter),
        }
    }
}

impl<M: EmbeddingModel> EmbeddingModel for RateLimitedEmbeddingModel<M> {
    const MAX_DOCUMENTS: usize = M::MAX_DOCUMENTS;

    fn ndims(&self) -> usize {
        self.model.ndims()
    }

    async fn embed_texts(
        &self,
        texts: impl IntoIterator<Item = String> + Send,
    ) -> Result<Vec<Embedding>, EmbeddingError> {
        self.limiter
            .until_ready()
            .instrument(debug_span!("limiter"))
            .await;
        self.model
            .embed_texts(texts)
            .instrument(info_span!("embed_texts"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mock_model::MockCompletionModel;
    use crate::processor::{Embedder, RigEmbedder};
    use rig::completion::Prompt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct LengthEmbeddingModel {
        calls: Arc<AtomicUsize>,
    }

    impl EmbeddingModel for LengthEmbeddingModel {
        const MAX_DOCUMENTS: usize = 8;

        fn ndims(&self) -> usize {
            2
        }

        async fn embed_texts(
            &self,
            texts: impl IntoIterator<Item = String> + Send,
        ) -> Result<Vec<Embedding>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .into_iter()
                .map(|text| Embedding {
                    vec: vec![text.len() as f64, 1.0],
                    document: text,
                })
                .collect())
        }
    }

    #[test]
    fn test_zero_quota_is_clamped() {
        let limiter = per_minute(0);
        assert!(limiter.check().is_ok());
    }

    #[tokio::test]
    async fn test_embedding_wrapper_delegates() {
        let inner = LengthEmbeddingModel::default();
        let limited = RateLimitedEmbeddingModel::new(inner.clone(), per_minute(100));
        assert_eq!(limited.ndims(), 2);

        let embedder = RigEmbedder::new(limited);
        assert_eq!(embedder.dimensions(), 2);
        assert_eq!(embedder.embed("four").await.unwrap(), vec![4.0, 1.0]);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_completion_wrapper_delegates() {
        let inner = MockCompletionModel::new();
        inner.set_text_response("limited answer").await;
        let limited = RateLimitedCompletionModel::new(inner.clone(), per_minute(100));

        let agent = rig::agent::AgentBuilder::new(limited).build();
        assert_eq!(agent.prompt("question").await.unwrap(), "limited answer");
        assert_eq!(inner.calls(), 1);
    }
}

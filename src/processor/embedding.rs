//! Embedding generation functionality for the processor module

use async_trait::async_trait;
use rig::embeddings::EmbeddingModel;
use tracing::{instrument, trace};

use crate::model::EmbeddingConversion;
use crate::processor::error::ProcessError;

/// Produces fixed-size vectors for text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder returns
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProcessError>;
}

/// Embedder backed by any rig embedding model
#[derive(Clone)]
pub struct RigEmbedder<E: EmbeddingModel> {
    model: E,
}

impl<E: EmbeddingModel> RigEmbedder<E> {
    pub fn new(model: E) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<E> Embedder for RigEmbedder<E>
where
    E: EmbeddingModel + 'static,
{
    fn dimensions(&self) -> usize {
        self.model.ndims()
    }

    #[instrument(skip(self, text), fields(len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProcessError> {
        let embeddings = self.model.embed_texts(vec![text.to_string()]).await?;
        let embedding = embeddings.first().ok_or_else(|| {
            ProcessError::EmbeddingGeneration("model returned no embedding".to_string())
        })?;
        trace!(dims = embedding.vec.len(), "Generated embedding");
        Ok(embedding.to_vec())
    }
}

/// 64-bit FNV-1a, stable across builds so stored vectors stay comparable.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// Deterministic local embedder using the hashing trick over word unigrams and
/// bigrams. The output is L2-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let hash = fnv1a(feature.as_bytes());
        let index = (hash % self.dimensions as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        for word in &words {
            let (index, sign) = self.bucket(word);
            vector[index] += sign;
        }
        for pair in words.windows(2) {
            let (index, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            vector[index] += sign * 0.5;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProcessError> {
        Ok(self.embed_sync(text))
    }
}

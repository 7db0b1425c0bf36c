//! Batch indexing of scraped pages
//!
//! Pages are buffered and indexed in groups. Each page becomes one document per
//! text chunk plus one per media transcript, each embedded and upserted into the
//! document index. Failures are counted per document and never abort the batch.

use std::ops::AddAssign;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::crawler::ScrapedPage;
use crate::index::{DocumentIndex, IndexDocument, IndexSchema};
use crate::processor::{Embedder, ProcessError, ProcessorConfig, Tagger, chunk_text};

/// Outcome of indexing one or more batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Documents upserted
    pub documents: usize,

    /// Documents that could not be embedded or stored
    pub failures: usize,
}

impl AddAssign for IndexStats {
    fn add_assign(&mut self, other: Self) {
        self.documents += other.documents;
        self.failures += other.failures;
    }
}

/// Buffers persisted pages and indexes them in batches
pub struct BatchIndexer {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn DocumentIndex>,
    tagger: Arc<dyn Tagger>,
    config: ProcessorConfig,
    index_name: String,
    pending: Vec<ScrapedPage>,
    totals: IndexStats,
}

impl BatchIndexer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn DocumentIndex>,
        tagger: Arc<dyn Tagger>,
        config: ProcessorConfig,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            index,
            tagger,
            config,
            index_name: index_name.into(),
            pending: Vec::new(),
            totals: IndexStats::default(),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Pages waiting for the next flush
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Everything indexed by this indexer so far
    pub fn totals(&self) -> IndexStats {
        self.totals
    }

    /// Create the target index sized to the embedder.
    pub async fn ensure_index(&self) -> Result<(), ProcessError> {
        let schema = IndexSchema {
            dimensions: self.embedder.dimensions(),
        };
        self.index.ensure_index(&self.index_name, &schema).await?;
        Ok(())
    }

    /// Buffer a page, indexing the batch once it reaches the flush threshold.
    pub async fn push(&mut self, page: ScrapedPage) -> IndexStats {
        self.pending.push(page);
        if self.pending.len() >= self.config.flush_threshold.max(1) {
            self.flush().await
        } else {
            IndexStats::default()
        }
    }

    /// Index every buffered page, full batch or not.
    pub async fn flush(&mut self) -> IndexStats {
        if self.pending.is_empty() {
            return IndexStats::default();
        }
        let pages = std::mem::take(&mut self.pending);
        let stats = self.index_batch(&pages).await;
        self.totals += stats;
        stats
    }

    /// Index `pages` without touching the buffer.
    #[instrument(skip(self, pages), fields(index = %self.index_name, pages = pages.len()))]
    pub async fn index_batch(&self, pages: &[ScrapedPage]) -> IndexStats {
        let mut stats = IndexStats::default();

        for page in pages {
            let tags = if page.tags.is_empty() {
                self.tagger.tags(&page.title, &page.content).await
            } else {
                page.tags.clone()
            };

            for document in self.page_documents(page, &tags) {
                match self.embed_and_upsert(document).await {
                    Ok(()) => stats.documents += 1,
                    Err(e) => {
                        warn!(url = %page.url, error = %e, "Failed to index document");
                        stats.failures += 1;
                    }
                }
            }
            debug!(url = %page.url, "Indexed page");
        }

        info!(
            documents = stats.documents,
            failures = stats.failures,
            "Indexed batch"
        );
        stats
    }

    /// Unembedded documents for a page: its chunks, then one per transcript
    fn page_documents(&self, page: &ScrapedPage, tags: &[String]) -> Vec<IndexDocument> {
        let document = |title: String, content: String, chunk_index: usize| IndexDocument {
            url: page.url.clone(),
            title,
            content,
            chunk_index,
            domain_id: page.domain_id,
            tags: tags.to_vec(),
            embedding: Vec::new(),
            media_kind: None,
            media_url: None,
        };

        let mut documents: Vec<IndexDocument> =
            chunk_text(&page.content, &self.config.chunk_options)
                .into_iter()
                .map(|chunk| document(page.title.clone(), chunk.text, chunk.position))
                .collect();

        for transcription in &page.transcriptions {
            let title = format!(
                "{} - {}",
                page.title,
                transcription.media_kind.as_str().to_uppercase()
            );
            let mut media = document(title, transcription.transcript_text.clone(), 0);
            media.media_kind = Some(transcription.media_kind);
            media.media_url = Some(transcription.source_url.clone());
            documents.push(media);
        }
        documents
    }

    async fn embed_and_upsert(&self, mut document: IndexDocument) -> Result<(), ProcessError> {
        document.embedding = self
            .embedder
            .embed(&format!("{} {}", document.title, document.content))
            .await?;
        self.index.upsert(&self.index_name, &document).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Database, DbError};
    use crate::media::{MediaKind, MediaTranscription};
    use crate::processor::{HashEmbedder, KeywordTagger};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embedder that fails on texts containing a marker
    struct PickyEmbedder;

    #[async_trait]
    impl Embedder for PickyEmbedder {
        fn dimensions(&self) -> usize {
            4
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProcessError> {
            if text.contains("poison") {
                Err(ProcessError::EmbeddingGeneration("refused".to_string()))
            } else {
                Ok(vec![0.5; 4])
            }
        }
    }

    #[derive(Default)]
    struct CountingTagger {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Tagger for CountingTagger {
        async fn tags(&self, _title: &str, _content: &str) -> Vec<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            vec!["counted".to_string()]
        }
    }

    struct FailingIndex;

    #[async_trait]
    impl DocumentIndex for FailingIndex {
        async fn ensure_index(&self, _: &str, _: &IndexSchema) -> Result<(), DbError> {
            Ok(())
        }

        async fn upsert(&self, _: &str, _: &IndexDocument) -> Result<(), DbError> {
            Err(DbError::Other("disk full".to_string()))
        }
    }

    fn page_with_words(url: &str, words: usize) -> ScrapedPage {
        let content = (0..words)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        ScrapedPage::new(1, url, "Page", content)
    }

    async fn indexer(flush_threshold: usize) -> (BatchIndexer, Database) {
        let db = Database::open_in_memory().await.unwrap();
        let config = ProcessorConfig::builder()
            .target_chunk_size(64)
            .flush_threshold(flush_threshold)
            .build();
        let indexer = BatchIndexer::new(
            Arc::new(HashEmbedder::new(16)),
            Arc::new(db.clone()),
            Arc::new(KeywordTagger::default()),
            config,
            "site-1",
        );
        indexer.ensure_index().await.unwrap();
        (indexer, db)
    }

    #[tokio::test]
    async fn test_push_flushes_at_threshold() {
        let (mut indexer, db) = indexer(2).await;

        let first = indexer.push(page_with_words("https://ex.test/a", 5)).await;
        assert_eq!(first, IndexStats::default());
        assert_eq!(indexer.pending(), 1);

        let second = indexer.push(page_with_words("https://ex.test/b", 5)).await;
        assert_eq!(second.documents, 2);
        assert_eq!(indexer.pending(), 0);
        assert_eq!(db.count_documents("site-1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_flush_drains_partial_batch() {
        let (mut indexer, db) = indexer(5).await;
        indexer.push(page_with_words("https://ex.test/a", 40)).await;
        assert_eq!(db.count_documents("site-1").await.unwrap(), 0);

        let stats = indexer.flush().await;
        let expected = chunk_text(
            &page_with_words("https://ex.test/a", 40).content,
            &indexer.config.chunk_options,
        )
        .len();
        assert!(expected > 1);
        assert_eq!(stats.documents, expected);
        assert_eq!(indexer.totals().documents, expected);
        assert_eq!(indexer.flush().await, IndexStats::default());
    }

    #[tokio::test]
    async fn test_media_documents() {
        let (indexer, db) = indexer(5).await;
        let mut page = ScrapedPage::new(1, "https://ex.test", "Talks", "intro text");
        page.transcriptions.push(MediaTranscription {
            source_url: "https://vimeo.com/42".to_string(),
            media_kind: MediaKind::Vimeo,
            transcript_text: "hello from the talk".to_string(),
            title: Some("Talk".to_string()),
            duration_secs: 30.0,
        });

        let stats = indexer.index_batch(&[page]).await;
        assert_eq!(stats.documents, 2);

        let documents = db.list_documents("site-1").await.unwrap();
        let media = documents
            .iter()
            .find(|d| d.media_kind.is_some())
            .unwrap();
        assert_eq!(media.title, "Talks - VIMEO");
        assert_eq!(media.chunk_index, 0);
        assert_eq!(media.media_url.as_deref(), Some("https://vimeo.com/42"));
        assert_eq!(media.content, "hello from the talk");
        assert!(documents.iter().all(|d| d.tags == vec!["talks", "intro", "text"]));
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let db = Database::open_in_memory().await.unwrap();
        let indexer = BatchIndexer::new(
            Arc::new(PickyEmbedder),
            Arc::new(db.clone()),
            Arc::new(KeywordTagger::default()),
            ProcessorConfig::default(),
            "site-9",
        );
        indexer.ensure_index().await.unwrap();

        let pages = vec![
            ScrapedPage::new(9, "https://ex.test/bad", "Bad", "poison pill"),
            ScrapedPage::new(9, "https://ex.test/good", "Good", "fine content"),
        ];
        let stats = indexer.index_batch(&pages).await;
        assert_eq!(stats, IndexStats { documents: 1, failures: 1 });

        let failing = BatchIndexer::new(
            Arc::new(HashEmbedder::new(4)),
            Arc::new(FailingIndex),
            Arc::new(KeywordTagger::default()),
            ProcessorConfig::default(),
            "any",
        );
        let stats = failing.index_batch(&pages).await;
        assert_eq!(stats, IndexStats { documents: 0, failures: 2 });
    }

    #[tokio::test]
    async fn test_precomputed_tags_skip_tagger() {
        let tagger = Arc::new(CountingTagger::default());
        let db = Database::open_in_memory().await.unwrap();
        let indexer = BatchIndexer::new(
            Arc::new(HashEmbedder::new(4)),
            Arc::new(db),
            tagger.clone(),
            ProcessorConfig::default(),
            "site-3",
        );
        indexer.ensure_index().await.unwrap();

        let mut tagged = ScrapedPage::new(3, "https://ex.test/a", "A", "some words");
        tagged.tags = vec!["given".to_string()];
        let untagged = ScrapedPage::new(3, "https://ex.test/b", "B", "other words");

        indexer.index_batch(&[tagged, untagged]).await;
        assert_eq!(tagger.calls.load(Ordering::SeqCst), 1);
    }
}

//! Crawl controller: drives one crawl run end to end
//!
//! The controller owns the frontier, the failure counters and the rendering
//! session for a single run. Each iteration pops a URL, fetches it, screens it
//! for blocking, extracts content and media, persists the page and hands it to
//! the batch indexer before enqueueing its same-domain links.
//!
//! Only a failed session start, a session that cannot be restarted, and the
//! circuit breaker end a run early. Every other per-URL problem is logged and
//! the run moves on. Pages persisted before an early end are kept, and the
//! partial batch is always flushed.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::crawler::frontier::normalize_parsed;
use crate::crawler::{
    CrawlError, CrawlerConfig, Frontier, FrontierEntry, PageStore, ProgressSink, ScrapedPage,
    analyze_page, same_domain,
};
use crate::index::DocumentIndex;
use crate::media::{MediaPipeline, MediaRef, MediaTranscription};
use crate::processor::{BatchIndexer, Embedder, IndexStats, Tagger};
use crate::render::{RenderError, RenderSession, RenderedPage, RendererFactory};

/// Capabilities a crawl run depends on
#[derive(Clone)]
pub struct CrawlServices {
    pub renderer: Arc<dyn RendererFactory>,

    /// Media transcription; `None` skips transcription but still records media refs
    pub media: Option<Arc<MediaPipeline>>,

    pub tagger: Arc<dyn Tagger>,

    pub embedder: Arc<dyn Embedder>,

    pub index: Arc<dyn DocumentIndex>,

    pub pages: Arc<dyn PageStore>,
}

/// Why a run stopped without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Nothing left to fetch
    FrontierExhausted,

    /// `max_pages` pages were persisted
    PageCap,

    /// The loop iteration budget ran out
    IterationCap,
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    /// Persisted pages in discovery order
    pub pages: Vec<ScrapedPage>,

    pub index: IndexStats,

    /// Frontier entries popped, including skipped ones
    pub iterations: usize,

    /// Fetch attempts made through the rendering session
    pub fetches: usize,

    pub stop_reason: StopReason,
}

/// Mutable state of one run
struct RunState {
    domain_id: i64,
    origin: Url,
    start_normalized: String,
    frontier: Frontier,
    pages: Vec<ScrapedPage>,
    consecutive_failures: u32,
    crash_retried: HashSet<String>,
    iterations: usize,
    fetches: usize,
}

pub struct CrawlController {
    services: CrawlServices,
    config: CrawlerConfig,
}

impl CrawlController {
    pub fn new(services: CrawlServices, config: CrawlerConfig) -> Self {
        Self { services, config }
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Crawl the site behind `start_url` and index everything found.
    #[instrument(skip(self, progress))]
    pub async fn run(
        &self,
        start_url: &str,
        domain_id: i64,
        progress: &dyn ProgressSink,
    ) -> Result<CrawlOutcome, CrawlError> {
        let origin = Url::parse(start_url.trim())
            .map_err(|e| CrawlError::InvalidStartUrl(format!("{}: {}", start_url, e)))?;
        let start_normalized = normalize_parsed(&origin).ok_or_else(|| {
            CrawlError::InvalidStartUrl(format!("{}: not an http(s) URL", start_url))
        })?;

        let mut frontier = Frontier::new(self.config.max_pending_urls, self.config.max_retries);
        frontier.push(origin.as_str());

        let mut session = RenderSession::new(
            Arc::clone(&self.services.renderer),
            self.config.render.clone(),
        );
        session.start().await.map_err(CrawlError::SessionInit)?;

        let mut indexer = BatchIndexer::new(
            Arc::clone(&self.services.embedder),
            Arc::clone(&self.services.index),
            Arc::clone(&self.services.tagger),
            self.config.processor.clone(),
            self.config.index_name_for(domain_id),
        );
        if let Err(e) = indexer.ensure_index().await {
            warn!(index = indexer.index_name(), error = %e, "Failed to prepare document index");
        }

        let mut state = RunState {
            domain_id,
            origin,
            start_normalized,
            frontier,
            pages: Vec::new(),
            consecutive_failures: 0,
            crash_retried: HashSet::new(),
            iterations: 0,
            fetches: 0,
        };

        let result = self
            .crawl(&mut state, &mut session, &mut indexer, progress)
            .await;

        indexer.flush().await;
        progress.report(state.pages.len()).await;
        session.close().await;

        let stop_reason = result?;
        let index = indexer.totals();
        info!(
            pages = state.pages.len(),
            documents = index.documents,
            index_failures = index.failures,
            iterations = state.iterations,
            fetches = state.fetches,
            ?stop_reason,
            "Crawl finished"
        );

        Ok(CrawlOutcome {
            pages: state.pages,
            index,
            iterations: state.iterations,
            fetches: state.fetches,
            stop_reason,
        })
    }

    async fn crawl(
        &self,
        state: &mut RunState,
        session: &mut RenderSession,
        indexer: &mut BatchIndexer,
        progress: &dyn ProgressSink,
    ) -> Result<StopReason, CrawlError> {
        let max_iterations = self.config.max_iterations();

        loop {
            if state.pages.len() >= self.config.max_pages {
                return Ok(StopReason::PageCap);
            }
            if state.iterations >= max_iterations {
                warn!(iterations = state.iterations, "Iteration budget exhausted");
                return Ok(StopReason::IterationCap);
            }
            let Some(entry) = state.frontier.pop() else {
                return Ok(StopReason::FrontierExhausted);
            };
            state.iterations += 1;

            if state.frontier.should_skip(&entry) {
                continue;
            }
            state.frontier.mark_visited(&entry);
            state.fetches += 1;

            let rendered = match session.load(&entry.fetch_url).await {
                Ok(rendered) => rendered,
                Err(e) => {
                    self.handle_fetch_error(state, session, entry, e).await?;
                    continue;
                }
            };

            if self.config.block_detector.is_blocked(&rendered) {
                warn!(url = %entry.fetch_url, "Blocking page detected");
                state.frontier.mark_exhausted(&entry);
                self.count_failure(state)?;
                continue;
            }

            self.process_page(state, entry, rendered, indexer, progress)
                .await?;
        }
    }

    async fn handle_fetch_error(
        &self,
        state: &mut RunState,
        session: &mut RenderSession,
        entry: FrontierEntry,
        error: RenderError,
    ) -> Result<(), CrawlError> {
        if error.is_crash() {
            session
                .restart()
                .await
                .map_err(|source| CrawlError::SessionLost {
                    pages_scraped: state.pages.len(),
                    source,
                })?;
            if state.crash_retried.insert(entry.normalized.clone()) {
                info!(url = %entry.fetch_url, "Renderer restarted, retrying page");
                state.frontier.retry_now(entry);
                return Ok(());
            }
            warn!(url = %entry.fetch_url, error = %error, "Page crashed the renderer twice, giving up");
            state.frontier.mark_exhausted(&entry);
            return self.count_failure(state);
        } else if matches!(error, RenderError::Launch(_)) {
            return Err(CrawlError::SessionLost {
                pages_scraped: state.pages.len(),
                source: error,
            });
        }

        if error.is_permanent() {
            warn!(url = %entry.fetch_url, error = %error, "Fetch failed permanently");
            state.frontier.mark_exhausted(&entry);
            return self.count_failure(state);
        }

        let attempts = state.frontier.record_failure(&entry);
        warn!(
            url = %entry.fetch_url,
            attempts,
            transient = error.is_transient(),
            error = %error,
            "Fetch failed"
        );
        state.frontier.retry_later(entry);
        self.count_failure(state)
    }

    /// Bump the consecutive failure count, opening the circuit at the limit.
    fn count_failure(&self, state: &mut RunState) -> Result<(), CrawlError> {
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.config.max_consecutive_failures {
            warn!(
                consecutive_failures = state.consecutive_failures,
                "Circuit breaker open"
            );
            return Err(CrawlError::CircuitOpen {
                consecutive_failures: state.consecutive_failures,
                pages_scraped: state.pages.len(),
            });
        }
        Ok(())
    }

    #[instrument(skip_all, fields(url = %entry.normalized))]
    async fn process_page(
        &self,
        state: &mut RunState,
        entry: FrontierEntry,
        rendered: RenderedPage,
        indexer: &mut BatchIndexer,
        progress: &dyn ProgressSink,
    ) -> Result<(), CrawlError> {
        let page_url = match Url::parse(&rendered.url).or_else(|_| Url::parse(&entry.fetch_url)) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Unparsable page URL");
                state.frontier.record_failure(&entry);
                return self.count_failure(state);
            }
        };

        let is_landing_page = entry.normalized == state.start_normalized;
        let options = self
            .config
            .extraction_options(self.config.media_scan.should_scan(is_landing_page));
        let analysis = analyze_page(&rendered.html, &page_url, &options);

        if analysis.content.content.trim().is_empty() && analysis.media_refs.is_empty() {
            debug!("No content extracted");
            return Ok(());
        }

        let transcriptions = self.transcribe_all(&analysis.media_refs).await;
        let title = if rendered.title.trim().is_empty() {
            analysis.content.title
        } else {
            rendered.title
        };
        let content = append_transcripts(analysis.content.content, &transcriptions);

        let mut page = ScrapedPage::new(state.domain_id, entry.normalized.clone(), title, content);
        page.media_refs = analysis.media_refs;
        page.transcriptions = transcriptions;
        page.tags = self.services.tagger.tags(&page.title, &page.content).await;

        match self.services.pages.insert_page(&page).await {
            Ok(id) => page.id = id,
            Err(e) => {
                warn!(error = %e, "Failed to persist page");
                state.frontier.record_failure(&entry);
                return self.count_failure(state);
            }
        }

        state.consecutive_failures = 0;
        state.pages.push(page.clone());
        indexer.push(page).await;

        let scraped = state.pages.len();
        if self.config.progress_interval > 0 && scraped % self.config.progress_interval == 0 {
            progress.report(scraped).await;
        }

        let mut enqueued = 0;
        for link in &analysis.links {
            if enqueued >= self.config.max_links_enqueued {
                break;
            }
            if same_domain(&state.origin, link) && state.frontier.push(link.as_str()) {
                enqueued += 1;
            }
        }
        debug!(scraped, enqueued, pending = state.frontier.len(), "Page stored");
        Ok(())
    }

    async fn transcribe_all(&self, media_refs: &[MediaRef]) -> Vec<MediaTranscription> {
        let Some(pipeline) = &self.services.media else {
            return Vec::new();
        };
        let mut transcriptions = Vec::new();
        for media in media_refs {
            if let Some(transcription) = pipeline.transcribe(media).await {
                transcriptions.push(transcription);
            }
        }
        transcriptions
    }
}

/// Append each transcript as `[KIND TRANSCRIPTION from URL]: text`.
fn append_transcripts(mut content: String, transcriptions: &[MediaTranscription]) -> String {
    for transcription in transcriptions {
        if !content.is_empty() {
            content.push_str("\n\n");
        }
        content.push_str(&format!(
            "[{} TRANSCRIPTION from {}]: {}",
            transcription.media_kind.as_str().to_uppercase(),
            transcription.source_url,
            transcription.transcript_text
        ));
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{MediaScanPolicy, NoopProgress, normalize_url};
    use crate::index::Database;
    use crate::jobs::JobStore;
    use crate::media::{
        AudioToolkit, FetchedAudio, MediaConfig, MediaError, MediaKind, MediaRef, SpeechToText,
    };
    use crate::processor::{ChunkOptions, HashEmbedder, KeywordTagger, chunk_text};
    use crate::render::{HttpRendererFactory, RenderCapability, RenderConfig};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone)]
    enum Reply {
        Html(&'static str),
        Generated(String),
        Timeout,
        Status(u16),
        CrashOnce(&'static str),
        Crash,
    }

    /// A fake website keyed by normalized URL, shared by every renderer launch
    #[derive(Default)]
    struct Site {
        pages: HashMap<String, Reply>,
        fetched: Mutex<Vec<String>>,
        crashed: Mutex<HashSet<String>>,
        launches: Mutex<usize>,
        refuse_launch: bool,
    }

    impl Site {
        fn with(pages: Vec<(&str, Reply)>) -> Arc<Self> {
            Arc::new(Self {
                pages: pages
                    .into_iter()
                    .map(|(url, reply)| (normalize_url(url).unwrap(), reply))
                    .collect(),
                ..Default::default()
            })
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }

        fn fetch_count(&self, url: &str) -> usize {
            let wanted = normalize_url(url);
            self.fetched()
                .iter()
                .filter(|u| normalize_url(u) == wanted)
                .count()
        }
    }

    struct SiteRenderer(Arc<Site>);

    #[async_trait]
    impl RenderCapability for SiteRenderer {
        async fn load(&mut self, url: &str, timeout: Duration) -> Result<RenderedPage, RenderError> {
            self.0.fetched.lock().unwrap().push(url.to_string());
            let key = normalize_url(url).unwrap_or_default();
            let html = match self.0.pages.get(&key) {
                Some(Reply::Html(html)) => html.to_string(),
                Some(Reply::Generated(html)) => html.clone(),
                Some(Reply::Timeout) => return Err(RenderError::Timeout(timeout)),
                Some(Reply::Status(code)) => return Err(RenderError::Status(*code)),
                Some(Reply::Crash) => {
                    return Err(RenderError::Crashed("target closed".to_string()));
                }
                Some(Reply::CrashOnce(html)) => {
                    if self.0.crashed.lock().unwrap().insert(key) {
                        return Err(RenderError::Crashed("target closed".to_string()));
                    }
                    html.to_string()
                }
                None => return Err(RenderError::Refused(url.to_string())),
            };
            Ok(RenderedPage {
                url: url.to_string(),
                title: crate::render::title_from_html(&html),
                html,
                status: Some(200),
            })
        }

        async fn close(&mut self) -> Result<(), RenderError> {
            Ok(())
        }
    }

    struct SiteFactory(Arc<Site>);

    #[async_trait]
    impl RendererFactory for SiteFactory {
        async fn launch(
            &self,
            _config: &RenderConfig,
            _launch: usize,
        ) -> Result<Box<dyn RenderCapability>, RenderError> {
            if self.0.refuse_launch {
                return Err(RenderError::Launch("no browser".to_string()));
            }
            *self.0.launches.lock().unwrap() += 1;
            Ok(Box::new(SiteRenderer(Arc::clone(&self.0))))
        }
    }

    /// Media host that is never reachable
    struct UnreachableMedia;

    #[async_trait]
    impl AudioToolkit for UnreachableMedia {
        async fn fetch_audio(
            &self,
            media: &MediaRef,
            _dir: &Path,
            _config: &MediaConfig,
        ) -> Result<FetchedAudio, MediaError> {
            Err(MediaError::Tool {
                tool: "yt-dlp".to_string(),
                message: format!("unable to download {}", media.url),
            })
        }

        async fn cut_window(&self, _: &Path, _: Duration, _: Duration, _: &Path) -> Result<(), MediaError> {
            Ok(())
        }
    }

    /// Media host that serves a short clip for every URL
    struct ShortClips;

    #[async_trait]
    impl AudioToolkit for ShortClips {
        async fn fetch_audio(
            &self,
            _media: &MediaRef,
            dir: &Path,
            _config: &MediaConfig,
        ) -> Result<FetchedAudio, MediaError> {
            Ok(FetchedAudio {
                path: dir.join("clip.wav"),
                title: Some("Clip".to_string()),
                duration: Duration::from_secs(20),
            })
        }

        async fn cut_window(&self, _: &Path, _: Duration, _: Duration, _: &Path) -> Result<(), MediaError> {
            Ok(())
        }
    }

    struct CannedSpeech;

    #[async_trait]
    impl SpeechToText for CannedSpeech {
        async fn transcribe(&self, _audio: &Path, _language: Option<&str>) -> Result<String, MediaError> {
            Ok("welcome to the tour".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingProgress(Mutex<Vec<usize>>);

    #[async_trait]
    impl ProgressSink for RecordingProgress {
        async fn report(&self, pages_scraped: usize) {
            self.0.lock().unwrap().push(pages_scraped);
        }
    }

    /// Services over a fresh database with `https://ex.test` registered; returns its domain id
    async fn services(
        site: &Arc<Site>,
        toolkit: Option<Arc<dyn AudioToolkit>>,
    ) -> (CrawlServices, Database, i64) {
        let db = Database::open_in_memory().await.unwrap();
        let domain = db.create_domain("https://ex.test").await.unwrap();
        let media = toolkit.map(|toolkit| {
            Arc::new(MediaPipeline::new(
                toolkit,
                Arc::new(CannedSpeech),
                MediaConfig::default(),
            ))
        });
        let services = CrawlServices {
            renderer: Arc::new(SiteFactory(Arc::clone(site))),
            media,
            tagger: Arc::new(KeywordTagger::default()),
            embedder: Arc::new(HashEmbedder::new(16)),
            index: Arc::new(db.clone()),
            pages: Arc::new(db.clone()),
        };
        (services, db, domain.id)
    }

    fn config() -> CrawlerConfig {
        CrawlerConfig::builder().index_name("test").build()
    }

    fn expected_documents(pages: &[ScrapedPage]) -> usize {
        pages
            .iter()
            .map(|p| chunk_text(&p.content, &ChunkOptions::default()).len() + p.transcriptions.len())
            .sum()
    }

    #[tokio::test]
    async fn test_crawl_stays_on_domain() {
        let site = Site::with(vec![
            (
                "https://ex.test/",
                Reply::Html(
                    "<html><head><title>Home</title></head><body><main>Welcome to the example \
                     site <a href=\"/a\">About</a> <a href=\"https://other.test/\">Elsewhere</a>\
                     </main></body></html>",
                ),
            ),
            (
                "https://ex.test/a",
                Reply::Html("<html><body><article>About the example team</article></body></html>"),
            ),
            ("https://other.test/", Reply::Html("<html><body>other</body></html>")),
        ]);
        let (services, db, domain_id) = services(&site, None).await;

        let outcome = CrawlController::new(services, config())
            .run("https://ex.test/", domain_id, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::FrontierExhausted);
        let urls: Vec<&str> = outcome.pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://ex.test", "https://ex.test/a"]);
        assert_eq!(site.fetch_count("https://other.test/"), 0);
        assert_eq!(outcome.pages[0].title, "Home");
        assert!(outcome.pages.iter().all(|p| p.id > 0 && !p.tags.is_empty()));

        let documents = db.list_documents("test").await.unwrap();
        for page in &outcome.pages {
            assert!(documents.iter().any(|d| d.url == page.url));
        }
        assert_eq!(documents.len(), expected_documents(&outcome.pages));
        assert_eq!(db.list_pages(domain_id, 1, 10).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_each_url_fetched_once() {
        let site = Site::with(vec![
            (
                "https://ex.test/",
                Reply::Html(
                    "<body>Start <a href=\"/a\">a</a> <a href=\"/a/\">a slash</a> \
                     <a href=\"/a?ref=nav#top\">a query</a> <a href=\"/b\">b</a></body>",
                ),
            ),
            ("https://ex.test/a", Reply::Html("<body>Page a <a href=\"/b\">b</a> <a href=\"/\">home</a></body>")),
            ("https://ex.test/b", Reply::Html("<body>Page b <a href=\"/a\">a</a></body>")),
        ]);
        let (services, _db, domain_id) = services(&site, None).await;

        let outcome = CrawlController::new(services, config())
            .run("https://ex.test", domain_id, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(outcome.pages.len(), 3);
        assert_eq!(site.fetched().len(), 3);
        for url in ["https://ex.test", "https://ex.test/a", "https://ex.test/b"] {
            assert_eq!(site.fetch_count(url), 1, "{url}");
        }
    }

    #[tokio::test]
    async fn test_circuit_breaker_keeps_persisted_pages() {
        let links: String = (0..15).map(|i| format!("<a href=\"/p{i}\">p{i}</a> ")).collect();
        let mut pages = vec![(
            "https://ex.test/",
            Reply::Generated(format!("<body>Index of pages {links}</body>")),
        )];
        let urls: Vec<String> = (0..15).map(|i| format!("https://ex.test/p{i}")).collect();
        for url in &urls {
            pages.push((url.as_str(), Reply::Timeout));
        }
        let site = Site::with(pages);
        let (services, db, domain_id) = services(&site, None).await;

        let err = CrawlController::new(services, config())
            .run("https://ex.test/", domain_id, &NoopProgress)
            .await
            .unwrap_err();

        match err {
            CrawlError::CircuitOpen {
                consecutive_failures,
                pages_scraped,
            } => {
                assert_eq!(consecutive_failures, 10);
                assert_eq!(pages_scraped, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(site.fetched().len(), 11);
        assert_eq!(db.list_pages(domain_id, 1, 10).await.unwrap().total, 1);
        assert!(db.count_documents("test").await.unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_failing_url_is_retried_at_most_three_times() {
        let site = Site::with(vec![
            ("https://ex.test/", Reply::Html("<body>Home <a href=\"/flaky\">flaky</a></body>")),
            ("https://ex.test/flaky", Reply::Timeout),
        ]);
        let (services, _db, domain_id) = services(&site, None).await;

        let outcome = CrawlController::new(services, config())
            .run("https://ex.test/", domain_id, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(site.fetch_count("https://ex.test/flaky"), 3);
        assert_eq!(outcome.pages.len(), 1);
        assert_eq!(outcome.stop_reason, StopReason::FrontierExhausted);
    }

    #[tokio::test]
    async fn test_blocked_page_is_not_retried_or_stored() {
        let site = Site::with(vec![
            ("https://ex.test/", Reply::Html("<body>Home <a href=\"/guarded\">guarded</a></body>")),
            (
                "https://ex.test/guarded",
                Reply::Html("<body>Cloudflare: checking your browser before access</body>"),
            ),
        ]);
        let (services, _db, domain_id) = services(&site, None).await;

        let outcome = CrawlController::new(services, config())
            .run("https://ex.test/", domain_id, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(site.fetch_count("https://ex.test/guarded"), 1);
        assert_eq!(outcome.pages.len(), 1);
    }

    #[tokio::test]
    async fn test_crash_restarts_session_and_retries_once() {
        let site = Site::with(vec![
            ("https://ex.test/", Reply::Html("<body>Home <a href=\"/heavy\">heavy</a></body>")),
            ("https://ex.test/heavy", Reply::CrashOnce("<body>Heavy page content</body>")),
        ]);
        let (services, _db, domain_id) = services(&site, None).await;

        let outcome = CrawlController::new(services, config())
            .run("https://ex.test/", domain_id, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(site.fetch_count("https://ex.test/heavy"), 2);
        assert_eq!(*site.launches.lock().unwrap(), 2);
        assert_eq!(outcome.pages.len(), 2);
        assert_eq!(outcome.pages[1].url, "https://ex.test/heavy");
    }

    #[tokio::test]
    async fn test_page_that_always_crashes_is_fetched_twice() {
        let site = Site::with(vec![
            (
                "https://ex.test/",
                Reply::Html("<body>Home <a href=\"/heavy\">heavy</a> <a href=\"/fine\">fine</a></body>"),
            ),
            ("https://ex.test/heavy", Reply::Crash),
            ("https://ex.test/fine", Reply::Html("<body>Fine page content</body>")),
        ]);
        let (services, _db, domain_id) = services(&site, None).await;

        let outcome = CrawlController::new(services, config())
            .run("https://ex.test/", domain_id, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(site.fetch_count("https://ex.test/heavy"), 2);
        assert_eq!(*site.launches.lock().unwrap(), 3);
        let urls: Vec<&str> = outcome.pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://ex.test", "https://ex.test/fine"]);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let site = Site::with(vec![
            (
                "https://ex.test/",
                Reply::Html("<body>Home <a href=\"/gone\">gone</a> <a href=\"/down\">down</a></body>"),
            ),
            ("https://ex.test/gone", Reply::Status(404)),
            ("https://ex.test/down", Reply::Status(503)),
        ]);
        let (services, _db, domain_id) = services(&site, None).await;

        let outcome = CrawlController::new(services, config())
            .run("https://ex.test/", domain_id, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(site.fetch_count("https://ex.test/gone"), 1);
        assert_eq!(site.fetch_count("https://ex.test/down"), 3);
        assert_eq!(outcome.pages.len(), 1);
    }

    #[tokio::test]
    async fn test_forbidden_responses_open_circuit() {
        let mut server = mockito::Server::new_async().await;
        let links: String = (0..12).map(|i| format!("<a href=\"/p{i}\">p{i}</a> ")).collect();
        server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(format!("<html><body><main>Directory {links}</main></body></html>"))
            .create_async()
            .await;
        let forbidden = server
            .mock("GET", mockito::Matcher::Regex(r"^/p\d+$".to_string()))
            .with_status(403)
            .with_body("Forbidden. Your request has been denied.")
            .expect(10)
            .create_async()
            .await;

        let site = Site::with(vec![]);
        let (mut services, db, domain_id) = services(&site, None).await;
        services.renderer = Arc::new(HttpRendererFactory::new());

        let err = CrawlController::new(services, config())
            .run(&server.url(), domain_id, &NoopProgress)
            .await
            .unwrap_err();

        assert!(
            matches!(
                err,
                CrawlError::CircuitOpen {
                    consecutive_failures: 10,
                    pages_scraped: 1
                }
            ),
            "unexpected error: {err}"
        );
        forbidden.assert_async().await;
        let listing = db.list_pages(domain_id, 1, 20).await.unwrap();
        assert_eq!(listing.total, 1);
        assert!(listing.pages.iter().all(|p| !p.content.contains("Forbidden")));
    }

    #[tokio::test]
    async fn test_unknown_domain_is_a_persistence_failure() {
        let site = Site::with(vec![(
            "https://ex.test/",
            Reply::Html("<body>Home <a href=\"/a\">a</a></body>"),
        )]);
        let (services, db, domain_id) = services(&site, None).await;
        let missing = domain_id + 100;

        let outcome = CrawlController::new(services, config())
            .run("https://ex.test/", missing, &NoopProgress)
            .await
            .unwrap();

        assert!(outcome.pages.is_empty());
        assert_eq!(outcome.stop_reason, StopReason::FrontierExhausted);
        assert_eq!(site.fetched().len(), 1);
        assert_eq!(db.list_pages(missing, 1, 10).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_unreachable_media_still_produces_page() {
        let site = Site::with(vec![(
            "https://ex.test/",
            Reply::Html("<html><body><video src=\"/talk.mp4\"></video></body></html>"),
        )]);
        let (services, db, domain_id) = services(&site, Some(Arc::new(UnreachableMedia))).await;

        let outcome = CrawlController::new(services, config())
            .run("https://ex.test/", domain_id, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(outcome.pages.len(), 1);
        let page = &outcome.pages[0];
        assert!(page.transcriptions.is_empty());
        assert_eq!(page.media_refs.len(), 1);
        assert_eq!(page.media_refs[0].url, "https://ex.test/talk.mp4");
        assert_eq!(db.list_pages(domain_id, 1, 10).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_transcripts_on_landing_page_only() {
        let site = Site::with(vec![
            (
                "https://ex.test/",
                Reply::Html(
                    "<body>Tour page <video src=\"/tour.mp4\"></video> <a href=\"/more\">more</a></body>",
                ),
            ),
            (
                "https://ex.test/more",
                Reply::Html("<body>More videos <video src=\"/extra.mp4\"></video></body>"),
            ),
        ]);
        let (services, db, domain_id) = services(&site, Some(Arc::new(ShortClips))).await;

        let outcome = CrawlController::new(services, config())
            .run("https://ex.test/", domain_id, &NoopProgress)
            .await
            .unwrap();

        let landing = &outcome.pages[0];
        assert_eq!(landing.transcriptions.len(), 1);
        assert_eq!(landing.transcriptions[0].media_kind, MediaKind::Video);
        assert!(landing.content.ends_with(
            "[VIDEO TRANSCRIPTION from https://ex.test/tour.mp4]: welcome to the tour"
        ));
        assert!(outcome.pages[1].transcriptions.is_empty());
        assert!(outcome.pages[1].media_refs.is_empty());

        assert_eq!(outcome.index.documents, expected_documents(&outcome.pages));
        assert_eq!(
            db.count_documents("test").await.unwrap(),
            expected_documents(&outcome.pages)
        );
    }

    #[tokio::test]
    async fn test_every_page_media_policy() {
        let site = Site::with(vec![
            ("https://ex.test/", Reply::Html("<body>Home <a href=\"/more\">more</a></body>")),
            (
                "https://ex.test/more",
                Reply::Html("<body>More <audio src=\"/cast.mp3\"></audio></body>"),
            ),
        ]);
        let (services, _db, domain_id) = services(&site, Some(Arc::new(ShortClips))).await;
        let config = CrawlerConfig::builder()
            .index_name("test")
            .media_scan(MediaScanPolicy::EveryPage)
            .build();

        let outcome = CrawlController::new(services, config)
            .run("https://ex.test/", domain_id, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(outcome.pages[1].transcriptions.len(), 1);
        assert_eq!(outcome.pages[1].transcriptions[0].media_kind, MediaKind::Audio);
    }

    #[tokio::test]
    async fn test_page_cap_and_progress() {
        let links: String = (0..10).map(|i| format!("<a href=\"/p{i}\">p{i}</a> ")).collect();
        let mut pages = vec![(
            "https://ex.test/",
            Reply::Generated(format!("<body>Index {links}</body>")),
        )];
        let urls: Vec<String> = (0..10).map(|i| format!("https://ex.test/p{i}")).collect();
        for url in &urls {
            pages.push((url.as_str(), Reply::Html("<body>Leaf page text</body>")));
        }
        let site = Site::with(pages);
        let (services, db, domain_id) = services(&site, None).await;
        let config = CrawlerConfig::builder()
            .index_name("test")
            .max_pages(3)
            .progress_interval(2)
            .processor(crate::processor::ProcessorConfig::builder().flush_threshold(2).build())
            .build();
        let progress = RecordingProgress::default();

        let outcome = CrawlController::new(services, config)
            .run("https://ex.test/", domain_id, &progress)
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::PageCap);
        assert_eq!(outcome.pages.len(), 3);
        assert_eq!(site.fetched().len(), 3);
        assert_eq!(*progress.0.lock().unwrap(), vec![2, 3]);
        assert_eq!(
            db.count_documents("test").await.unwrap(),
            expected_documents(&outcome.pages)
        );
    }

    #[tokio::test]
    async fn test_empty_page_is_neither_success_nor_failure() {
        let site = Site::with(vec![
            ("https://ex.test/", Reply::Html("<body>Home <a href=\"/blank\">blank</a></body>")),
            ("https://ex.test/blank", Reply::Html("<body><script>var x = 1;</script></body>")),
        ]);
        let (services, _db, domain_id) = services(&site, None).await;

        let outcome = CrawlController::new(services, config())
            .run("https://ex.test/", domain_id, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(outcome.pages.len(), 1);
        assert_eq!(site.fetch_count("https://ex.test/blank"), 1);
    }

    #[tokio::test]
    async fn test_session_start_failure_is_fatal() {
        let site = Arc::new(Site {
            refuse_launch: true,
            ..Default::default()
        });
        let (services, _db, domain_id) = services(&site, None).await;

        let err = CrawlController::new(services, config())
            .run("https://ex.test/", domain_id, &NoopProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::SessionInit(_)));
        assert!(site.fetched().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_start_url() {
        let site = Site::with(vec![]);
        let (services, _db, domain_id) = services(&site, None).await;
        let controller = CrawlController::new(services, config());

        for url in ["ftp://ex.test/", "not a url"] {
            let err = controller.run(url, domain_id, &NoopProgress).await.unwrap_err();
            assert!(matches!(err, CrawlError::InvalidStartUrl(_)), "{url}");
        }
    }

    #[test]
    fn test_append_transcripts() {
        let transcription = MediaTranscription {
            source_url: "https://www.youtube.com/watch?v=abc".to_string(),
            media_kind: MediaKind::Youtube,
            transcript_text: "hi".to_string(),
            title: None,
            duration_secs: 1.0,
        };
        assert_eq!(
            append_transcripts("Body".to_string(), std::slice::from_ref(&transcription)),
            "Body\n\n[YOUTUBE TRANSCRIPTION from https://www.youtube.com/watch?v=abc]: hi"
        );
        assert_eq!(
            append_transcripts(String::new(), &[transcription]),
            "[YOUTUBE TRANSCRIPTION from https://www.youtube.com/watch?v=abc]: hi"
        );
    }
}

//! Download, window and transcribe a single media item

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

use super::{
    AudioToolkit, FetchedAudio, MediaConfig, MediaError, MediaRef, MediaTranscription, SpeechToText,
};

/// Split `duration` into consecutive `(start, length)` windows of at most `window`.
pub fn window_bounds(duration: Duration, window: Duration) -> Vec<(Duration, Duration)> {
    if window.is_zero() {
        return vec![(Duration::ZERO, duration)];
    }
    let mut bounds = Vec::new();
    let mut start = Duration::ZERO;
    while start < duration {
        let length = window.min(duration - start);
        bounds.push((start, length));
        start += length;
    }
    bounds
}

/// Turns a media reference into a transcript.
#[derive(Clone)]
pub struct MediaPipeline {
    toolkit: Arc<dyn AudioToolkit>,
    stt: Arc<dyn SpeechToText>,
    config: MediaConfig,
}

impl MediaPipeline {
    pub fn new(
        toolkit: Arc<dyn AudioToolkit>,
        stt: Arc<dyn SpeechToText>,
        config: MediaConfig,
    ) -> Self {
        Self {
            toolkit,
            stt,
            config,
        }
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    /// Transcribe `media`, logging and swallowing any failure.
    ///
    /// Returns `None` when the media cannot be fetched or yields no speech.
    #[instrument(skip(self), fields(url = %media.url, kind = %media.kind))]
    pub async fn transcribe(&self, media: &MediaRef) -> Option<MediaTranscription> {
        match self.try_transcribe(media).await {
            Ok(Some(transcription)) => {
                info!(
                    chars = transcription.transcript_text.len(),
                    duration_secs = transcription.duration_secs,
                    "Transcribed media"
                );
                Some(transcription)
            }
            Ok(None) => {
                debug!("Media produced no transcript");
                None
            }
            Err(e) => {
                warn!(error = %e, "Media transcription failed");
                None
            }
        }
    }

    /// Transcribe `media`, surfacing failures to the caller.
    ///
    /// Every artifact lives in a scratch directory that is removed before this
    /// returns, whether or not transcription succeeded.
    pub async fn try_transcribe(
        &self,
        media: &MediaRef,
    ) -> Result<Option<MediaTranscription>, MediaError> {
        let scratch = self.scratch_dir()?;
        let result = self.transcribe_in(media, scratch.path()).await;
        if let Err(e) = scratch.close() {
            warn!(error = %e, "Failed to remove media scratch directory");
        }
        result
    }

    fn scratch_dir(&self) -> Result<TempDir, MediaError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("siteindex-media-");
        let dir = match &self.config.work_dir {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    async fn transcribe_in(
        &self,
        media: &MediaRef,
        dir: &Path,
    ) -> Result<Option<MediaTranscription>, MediaError> {
        let audio = self.toolkit.fetch_audio(media, dir, &self.config).await?;
        let language = self.config.language.as_deref();

        let text = if audio.duration > self.config.window {
            self.transcribe_windows(&audio, dir, language).await
        } else {
            self.stt.transcribe(&audio.path, language).await?
        };

        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        Ok(Some(MediaTranscription {
            source_url: media.url.clone(),
            media_kind: media.kind,
            transcript_text: text.to_string(),
            title: audio.title,
            duration_secs: audio.duration.as_secs_f64(),
        }))
    }

    async fn transcribe_windows(
        &self,
        audio: &FetchedAudio,
        dir: &Path,
        language: Option<&str>,
    ) -> String {
        let windows = window_bounds(audio.duration, self.config.window);
        debug!(windows = windows.len(), "Splitting long audio");

        let mut parts = Vec::with_capacity(windows.len());
        for (index, (start, length)) in windows.into_iter().enumerate() {
            let dest = dir.join(format!("window_{index:03}.wav"));
            match self.toolkit.cut_window(&audio.path, start, length, &dest).await {
                Ok(()) => match self.stt.transcribe(&dest, language).await {
                    Ok(text) => {
                        let text = text.trim();
                        if !text.is_empty() {
                            parts.push(text.to_string());
                        }
                    }
                    Err(e) => warn!(window = index, error = %e, "Window transcription failed"),
                },
                Err(e) => warn!(window = index, error = %e, "Failed to cut audio window"),
            }
            let _ = tokio::fs::remove_file(&dest).await;
        }
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct FakeToolkit {
        duration: Duration,
        fail_fetch: bool,
        fail_window: Option<usize>,
        seen_dirs: Mutex<Vec<PathBuf>>,
        windows: Mutex<Vec<(Duration, Duration)>>,
    }

    impl FakeToolkit {
        fn new(duration: Duration) -> Self {
            Self {
                duration,
                fail_fetch: false,
                fail_window: None,
                seen_dirs: Mutex::new(Vec::new()),
                windows: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AudioToolkit for FakeToolkit {
        async fn fetch_audio(
            &self,
            media: &MediaRef,
            dir: &Path,
            _config: &MediaConfig,
        ) -> Result<FetchedAudio, MediaError> {
            self.seen_dirs.lock().unwrap().push(dir.to_path_buf());
            // leave a partially named sibling behind, as real downloaders do
            std::fs::write(dir.join("media.webm.part"), b"partial")?;
            if self.fail_fetch {
                return Err(MediaError::MissingAudio(media.url.clone()));
            }
            let path = dir.join("media.wav");
            std::fs::write(&path, b"full")?;
            Ok(FetchedAudio {
                path,
                title: Some("Intro".to_string()),
                duration: self.duration,
            })
        }

        async fn cut_window(
            &self,
            _source: &Path,
            start: Duration,
            length: Duration,
            dest: &Path,
        ) -> Result<(), MediaError> {
            let index = {
                let mut windows = self.windows.lock().unwrap();
                windows.push((start, length));
                windows.len() - 1
            };
            if self.fail_window == Some(index) {
                return Err(MediaError::Tool {
                    tool: "ffmpeg".to_string(),
                    message: "bad window".to_string(),
                });
            }
            std::fs::write(dest, format!("window {index}"))?;
            Ok(())
        }
    }

    /// Echoes the file contents back as the transcript
    struct EchoStt;

    #[async_trait]
    impl SpeechToText for EchoStt {
        async fn transcribe(&self, audio: &Path, _language: Option<&str>) -> Result<String, MediaError> {
            Ok(std::fs::read_to_string(audio)?)
        }
    }

    struct SilentStt;

    #[async_trait]
    impl SpeechToText for SilentStt {
        async fn transcribe(&self, _audio: &Path, _language: Option<&str>) -> Result<String, MediaError> {
            Ok("   ".to_string())
        }
    }

    fn video() -> MediaRef {
        MediaRef {
            url: "https://ex.test/intro.mp4".to_string(),
            kind: MediaKind::Video,
        }
    }

    #[test]
    fn test_window_bounds() {
        let window = Duration::from_secs(180);
        assert_eq!(window_bounds(Duration::from_secs(100), window).len(), 1);
        assert_eq!(window_bounds(Duration::from_secs(360), window).len(), 2);

        let bounds = window_bounds(Duration::from_secs(400), window);
        assert_eq!(
            bounds,
            vec![
                (Duration::ZERO, window),
                (Duration::from_secs(180), window),
                (Duration::from_secs(360), Duration::from_secs(40)),
            ]
        );
    }

    #[tokio::test]
    async fn test_short_media_is_transcribed_directly() {
        let toolkit = Arc::new(FakeToolkit::new(Duration::from_secs(60)));
        let pipeline = MediaPipeline::new(toolkit.clone(), Arc::new(EchoStt), MediaConfig::default());

        let transcription = pipeline.transcribe(&video()).await.unwrap();
        assert_eq!(transcription.transcript_text, "full");
        assert_eq!(transcription.media_kind, MediaKind::Video);
        assert_eq!(transcription.title.as_deref(), Some("Intro"));
        assert!(toolkit.windows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_long_media_is_windowed_and_joined() {
        let toolkit = Arc::new(FakeToolkit::new(Duration::from_secs(400)));
        let pipeline = MediaPipeline::new(toolkit.clone(), Arc::new(EchoStt), MediaConfig::default());

        let transcription = pipeline.transcribe(&video()).await.unwrap();
        assert_eq!(transcription.transcript_text, "window 0 window 1 window 2");
        assert_eq!(transcription.duration_secs, 400.0);
        assert_eq!(toolkit.windows.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failing_window_is_skipped() {
        let mut toolkit = FakeToolkit::new(Duration::from_secs(400));
        toolkit.fail_window = Some(1);
        let pipeline = MediaPipeline::new(Arc::new(toolkit), Arc::new(EchoStt), MediaConfig::default());

        let transcription = pipeline.transcribe(&video()).await.unwrap();
        assert_eq!(transcription.transcript_text, "window 0 window 2");
    }

    #[tokio::test]
    async fn test_scratch_directory_is_removed_on_success_and_failure() {
        let work = tempfile::tempdir().unwrap();
        let config = MediaConfig::builder().work_dir(work.path()).build();

        let ok = Arc::new(FakeToolkit::new(Duration::from_secs(30)));
        let pipeline = MediaPipeline::new(ok.clone(), Arc::new(EchoStt), config.clone());
        assert!(pipeline.transcribe(&video()).await.is_some());

        let mut failing = FakeToolkit::new(Duration::from_secs(30));
        failing.fail_fetch = true;
        let failing = Arc::new(failing);
        let pipeline = MediaPipeline::new(failing.clone(), Arc::new(EchoStt), config);
        assert!(pipeline.transcribe(&video()).await.is_none());

        for dir in ok.seen_dirs.lock().unwrap().iter().chain(failing.seen_dirs.lock().unwrap().iter()) {
            assert!(dir.starts_with(work.path()));
            assert!(!dir.exists(), "{} was not cleaned up", dir.display());
        }
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_silence_yields_none() {
        let toolkit = Arc::new(FakeToolkit::new(Duration::from_secs(30)));
        let pipeline = MediaPipeline::new(toolkit, Arc::new(SilentStt), MediaConfig::default());
        assert!(pipeline.transcribe(&video()).await.is_none());
    }
}

//! Media transcription for crawled pages
//!
//! Pages can embed audio and video. The [`MediaPipeline`] downloads the audio
//! track of a [`MediaRef`], splits long recordings into fixed windows and hands
//! each window to a [`SpeechToText`] capability. The download and cutting steps
//! sit behind [`AudioToolkit`] so the pipeline can run against yt-dlp/ffmpeg in
//! production and against fakes in tests.

mod config;
mod error;
mod pipeline;
mod tools;
mod whisper;

pub use config::{MediaConfig, MediaConfigBuilder};
pub use error::MediaError;
pub use pipeline::{MediaPipeline, window_bounds};
pub use tools::YtDlpToolkit;
pub use whisper::WhisperCommand;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Kind of a discovered media reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Youtube,
    Vimeo,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Youtube => "youtube",
            Self::Vimeo => "vimeo",
        }
    }

    /// Parse the lowercase name produced by [`as_str`](Self::as_str)
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            "youtube" => Some(Self::Youtube),
            "vimeo" => Some(Self::Vimeo),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A media item discovered on a page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaRef {
    /// Absolute URL, canonicalized for known video hosts
    pub url: String,

    /// What kind of media the URL points at
    pub kind: MediaKind,
}

/// Transcript of one media item, stored on the page that embeds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaTranscription {
    pub source_url: String,
    pub media_kind: MediaKind,
    pub transcript_text: String,
    pub title: Option<String>,
    /// Length of the recording in seconds
    pub duration_secs: f64,
}

/// Audio downloaded for one media item
#[derive(Debug, Clone)]
pub struct FetchedAudio {
    /// Resampled wav file inside the scratch directory
    pub path: PathBuf,

    /// Title reported by the media host
    pub title: Option<String>,

    /// Measured duration
    pub duration: Duration,
}

/// Downloads and cuts audio.
#[async_trait]
pub trait AudioToolkit: Send + Sync {
    /// Download the best audio track of `media` into `dir`, resampled per `config`.
    async fn fetch_audio(
        &self,
        media: &MediaRef,
        dir: &Path,
        config: &MediaConfig,
    ) -> Result<FetchedAudio, MediaError>;

    /// Write `length` of `source` starting at `start` to `dest`.
    async fn cut_window(
        &self,
        source: &Path,
        start: Duration,
        length: Duration,
        dest: &Path,
    ) -> Result<(), MediaError>;
}

/// Converts an audio file to text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<String, MediaError>;
}

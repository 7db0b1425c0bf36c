//! Configuration for the media transcription pipeline

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for downloading, windowing and transcribing media
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Audio longer than this is split into windows of this length
    pub window: Duration,

    /// Sample rate handed to speech-to-text
    pub sample_rate: u32,

    /// Channel count handed to speech-to-text
    pub channels: u16,

    /// Language hint for speech-to-text
    pub language: Option<String>,

    /// Parent directory for per-item scratch directories (system temp by default)
    pub work_dir: Option<PathBuf>,

    /// Budget for each external command
    pub command_timeout: Duration,

    /// yt-dlp executable
    pub yt_dlp_bin: String,

    /// ffmpeg executable
    pub ffmpeg_bin: String,

    /// ffprobe executable
    pub ffprobe_bin: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(180),
            sample_rate: 16_000,
            channels: 1,
            language: None,
            work_dir: None,
            command_timeout: Duration::from_secs(600),
            yt_dlp_bin: "yt-dlp".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
        }
    }
}

/// Builder for MediaConfig
#[derive(Debug, Default)]
pub struct MediaConfigBuilder {
    config: MediaConfig,
}

impl MediaConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: MediaConfig::default(),
        }
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.config.channels = channels;
        self
    }

    pub fn language(mut self, language: Option<String>) -> Self {
        self.config.language = language;
        self
    }

    pub fn work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(work_dir.into());
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    pub fn yt_dlp_bin(mut self, bin: impl Into<String>) -> Self {
        self.config.yt_dlp_bin = bin.into();
        self
    }

    pub fn ffmpeg_bin(mut self, bin: impl Into<String>) -> Self {
        self.config.ffmpeg_bin = bin.into();
        self
    }

    pub fn ffprobe_bin(mut self, bin: impl Into<String>) -> Self {
        self.config.ffprobe_bin = bin.into();
        self
    }

    pub fn build(self) -> MediaConfig {
        self.config
    }
}

impl MediaConfig {
    /// Create a new builder
    pub fn builder() -> MediaConfigBuilder {
        MediaConfigBuilder::new()
    }
}

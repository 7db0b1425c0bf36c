//! Speech-to-text through a whisper.cpp style command line

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::instrument;

use super::tools::run_command;
use super::{MediaError, SpeechToText};

/// Runs `<bin> -m <model> -f <audio> -nt [-l <lang>]` and reads the transcript from stdout
#[derive(Debug, Clone)]
pub struct WhisperCommand {
    bin: String,
    model: PathBuf,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl WhisperCommand {
    pub fn new(bin: impl Into<String>, model: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            model: model.into(),
            extra_args: Vec::new(),
            timeout: Duration::from_secs(600),
        }
    }

    /// Extra flags appended after the standard ones
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn args(&self, audio: &Path, language: Option<&str>) -> Vec<String> {
        let mut args = vec![
            "-m".to_string(),
            self.model.display().to_string(),
            "-f".to_string(),
            audio.display().to_string(),
            "-nt".to_string(),
        ];
        if let Some(language) = language {
            args.push("-l".to_string());
            args.push(language.to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Collapse whisper's line-per-segment output into one paragraph.
fn join_segments(stdout: &str) -> String {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl SpeechToText for WhisperCommand {
    #[instrument(skip(self))]
    async fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<String, MediaError> {
        let stdout = run_command(&self.bin, &self.args(audio, language), self.timeout)
            .await
            .map_err(|e| MediaError::Transcription(e.to_string()))?;
        Ok(join_segments(&stdout))
    }
}

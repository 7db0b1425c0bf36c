//! yt-dlp and ffmpeg backed audio toolkit

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{AudioToolkit, FetchedAudio, MediaConfig, MediaError, MediaRef};

/// Run `program` with `args`, returning stdout on success.
pub(crate) async fn run_command(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<String, MediaError> {
    debug!(program, ?args, "Running external tool");
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| MediaError::Tool {
            tool: program.to_string(),
            message: format!("failed to spawn: {}", e),
        })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| MediaError::Timeout {
            tool: program.to_string(),
            timeout,
        })??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = stderr.lines().last().unwrap_or("").trim().to_string();
        return Err(MediaError::Tool {
            tool: program.to_string(),
            message: if message.is_empty() {
                output.status.to_string()
            } else {
                message
            },
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn secs(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

/// Downloads with yt-dlp and measures/cuts with ffprobe/ffmpeg
#[derive(Debug, Clone)]
pub struct YtDlpToolkit {
    config: MediaConfig,
}

impl YtDlpToolkit {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    async fn measure_duration(&self, path: &Path) -> Result<Duration, MediaError> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path.display().to_string(),
        ];
        let stdout = run_command(&self.config.ffprobe_bin, &args, self.config.command_timeout).await?;
        let secs: f64 = stdout
            .trim()
            .parse()
            .map_err(|_| MediaError::Parse(format!("ffprobe duration {:?}", stdout.trim())))?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }

    async fn resample(&self, source: &Path, dest: &Path, config: &MediaConfig) -> Result<(), MediaError> {
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            source.display().to_string(),
            "-ar".to_string(),
            config.sample_rate.to_string(),
            "-ac".to_string(),
            config.channels.to_string(),
            dest.display().to_string(),
        ];
        run_command(&self.config.ffmpeg_bin, &args, self.config.command_timeout).await?;
        Ok(())
    }
}

/// Find the downloaded file named `stem.*`, preferring wav.
fn find_download(dir: &Path, stem: &str) -> Result<Option<PathBuf>, MediaError> {
    let mut found = None;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let matches_stem = path.file_stem().and_then(|s| s.to_str()) == Some(stem);
        let is_partial = path.extension().and_then(|e| e.to_str()) == Some("part");
        if !matches_stem || is_partial {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) == Some("wav") {
            return Ok(Some(path));
        }
        found = Some(path);
    }
    Ok(found)
}

#[async_trait]
impl AudioToolkit for YtDlpToolkit {
    #[instrument(skip(self, config), fields(url = %media.url))]
    async fn fetch_audio(
        &self,
        media: &MediaRef,
        dir: &Path,
        config: &MediaConfig,
    ) -> Result<FetchedAudio, MediaError> {
        let template = dir.join("media.%(ext)s");
        let args = vec![
            "-f".to_string(),
            "bestaudio/best".to_string(),
            "-x".to_string(),
            "--audio-format".to_string(),
            "wav".to_string(),
            "--postprocessor-args".to_string(),
            format!("ffmpeg:-ar {} -ac {}", config.sample_rate, config.channels),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--dump-json".to_string(),
            "--no-simulate".to_string(),
            "-o".to_string(),
            template.display().to_string(),
            media.url.clone(),
        ];
        let stdout = run_command(&self.config.yt_dlp_bin, &args, self.config.command_timeout).await?;

        let info: Option<serde_json::Value> = stdout
            .lines()
            .rev()
            .find_map(|line| serde_json::from_str(line).ok());
        let title = info
            .as_ref()
            .and_then(|v| v.get("title"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let downloaded =
            find_download(dir, "media")?.ok_or_else(|| MediaError::MissingAudio(media.url.clone()))?;
        let path = if downloaded.extension().and_then(|e| e.to_str()) == Some("wav") {
            downloaded
        } else {
            let wav = dir.join("media_resampled.wav");
            self.resample(&downloaded, &wav, config).await?;
            wav
        };

        let duration = match info.as_ref().and_then(|v| v.get("duration")).and_then(|v| v.as_f64()) {
            Some(secs) if secs > 0.0 => Duration::from_secs_f64(secs),
            _ => self.measure_duration(&path).await?,
        };

        Ok(FetchedAudio {
            path,
            title,
            duration,
        })
    }

    async fn cut_window(
        &self,
        source: &Path,
        start: Duration,
        length: Duration,
        dest: &Path,
    ) -> Result<(), MediaError> {
        let args = vec![
            "-y".to_string(),
            "-ss".to_string(),
            secs(start),
            "-t".to_string(),
            secs(length),
            "-i".to_string(),
            source.display().to_string(),
            "-ar".to_string(),
            self.config.sample_rate.to_string(),
            "-ac".to_string(),
            self.config.channels.to_string(),
            dest.display().to_string(),
        ];
        run_command(&self.config.ffmpeg_bin, &args, self.config.command_timeout).await?;
        Ok(())
    }
}

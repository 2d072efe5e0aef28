//! ffmpeg / ffprobe invocation.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::pipeline::error::{tail_bytes, PipelineError};

/// External media tool. Success is exit status zero; stderr is the diagnostic.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Run ffmpeg with the given arguments, blocking until it exits.
    async fn run(&self, args: &[String]) -> Result<(), PipelineError>;

    /// Read stream metadata for a media file.
    async fn probe(&self, path: &Path) -> Result<ProbeData, PipelineError>;
}

/// Subset of ffprobe's JSON output the pipeline uses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeData {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeStream {
    pub codec_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub r_frame_rate: Option<String>,
    pub avg_frame_rate: Option<String>,
}

impl ProbeData {
    pub fn video_stream(&self) -> Option<&ProbeStream> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
    }

    pub fn has_audio(&self) -> bool {
        self.streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio"))
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let stream = self.video_stream()?;
        Some((stream.width?, stream.height?))
    }

    /// Native frame rate of the first video stream, if it parses.
    pub fn frame_rate(&self) -> Option<f64> {
        let stream = self.video_stream()?;
        stream
            .r_frame_rate
            .as_deref()
            .and_then(parse_rate)
            .or_else(|| stream.avg_frame_rate.as_deref().and_then(parse_rate))
    }
}

/// Parse `"30000/1001"` or `"25"` into frames per second.
pub fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Runs the ffmpeg and ffprobe binaries found at the configured paths.
pub struct FfmpegCli {
    ffmpeg_bin: PathBuf,
    ffprobe_bin: PathBuf,
    stderr_limit: usize,
}

impl FfmpegCli {
    pub fn new(ffmpeg_bin: PathBuf, ffprobe_bin: PathBuf, stderr_limit: usize) -> Self {
        Self {
            ffmpeg_bin,
            ffprobe_bin,
            stderr_limit,
        }
    }
}

#[async_trait]
impl MediaTool for FfmpegCli {
    async fn run(&self, args: &[String]) -> Result<(), PipelineError> {
        tracing::debug!(command = %format!("{} {}", self.ffmpeg_bin.display(), args.join(" ")), "Executing ffmpeg");

        let output = Command::new(&self.ffmpeg_bin)
            .args(["-hide_banner", "-nostdin", "-loglevel", "error"])
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| PipelineError::Spawn {
                tool: "ffmpeg",
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Tool {
                tool: "ffmpeg",
                code: output.status.code().unwrap_or(-1),
                stderr: tail_bytes(&stderr, self.stderr_limit),
            });
        }

        Ok(())
    }

    async fn probe(&self, path: &Path) -> Result<ProbeData, PipelineError> {
        let output = Command::new(&self.ffprobe_bin)
            .arg("-v")
            .arg("error")
            .arg("-print_format")
            .arg("json")
            .arg("-show_streams")
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| PipelineError::Spawn {
                tool: "ffprobe",
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Tool {
                tool: "ffprobe",
                code: output.status.code().unwrap_or(-1),
                stderr: tail_bytes(&stderr, self.stderr_limit),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            PipelineError::Input(format!("unreadable ffprobe output for {}: {e}", path.display()))
        })
    }
}

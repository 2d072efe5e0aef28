use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::job::JobType;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Prometheus listener for the worker process
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for job queue
    pub redis_url: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    #[serde(default = "default_source_bucket")]
    pub source_bucket: String,

    #[serde(default = "default_output_bucket")]
    pub output_bucket: String,

    #[serde(default = "default_faces_bucket")]
    pub faces_bucket: String,

    /// Base URL of the face model server
    #[serde(default = "default_model_server_url")]
    pub model_server_url: String,

    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg_bin: PathBuf,

    #[serde(default = "default_ffprobe_bin")]
    pub ffprobe_bin: PathBuf,

    /// Parent directory for per-job working directories
    #[serde(default = "std::env::temp_dir")]
    pub work_root: PathBuf,

    /// TrueType font used for caption rendering
    #[serde(default = "default_caption_font_path")]
    pub caption_font_path: PathBuf,

    #[serde(default = "default_video_timeout")]
    pub video_timeout_secs: u64,

    #[serde(default = "default_caption_timeout")]
    pub caption_timeout_secs: u64,

    #[serde(default = "default_faceswap_timeout")]
    pub faceswap_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9100".to_string()
}

fn default_source_bucket() -> String {
    "videos".to_string()
}

fn default_output_bucket() -> String {
    "outputs".to_string()
}

fn default_faces_bucket() -> String {
    "faces".to_string()
}

fn default_model_server_url() -> String {
    "http://127.0.0.1:8500".to_string()
}

fn default_ffmpeg_bin() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_bin() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_caption_font_path() -> PathBuf {
    PathBuf::from("/usr/share/fonts/truetype/anton/Anton-Regular.ttf")
}

fn default_video_timeout() -> u64 {
    600
}

fn default_caption_timeout() -> u64 {
    300
}

fn default_faceswap_timeout() -> u64 {
    1800
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn processing(&self) -> ProcessingConfig {
        ProcessingConfig {
            source_bucket: self.source_bucket.clone(),
            output_bucket: self.output_bucket.clone(),
            faces_bucket: self.faces_bucket.clone(),
            work_root: self.work_root.clone(),
            caption_font_path: self.caption_font_path.clone(),
            video_timeout_secs: self.video_timeout_secs,
            caption_timeout_secs: self.caption_timeout_secs,
            faceswap_timeout_secs: self.faceswap_timeout_secs,
            ..ProcessingConfig::default()
        }
    }
}

/// Settings the orchestrator reads while running a job.
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub source_bucket: String,
    pub output_bucket: String,
    pub faces_bucket: String,
    pub work_root: PathBuf,
    pub caption_font_path: PathBuf,
    /// Fixed output size for photo variants.
    pub photo_width: u32,
    pub photo_height: u32,
    /// Rate used when the source frame rate cannot be parsed.
    pub fallback_fps: f64,
    /// Bytes of ffmpeg stderr kept in error messages.
    pub stderr_limit: usize,
    pub video_timeout_secs: u64,
    pub caption_timeout_secs: u64,
    pub faceswap_timeout_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            source_bucket: default_source_bucket(),
            output_bucket: default_output_bucket(),
            faces_bucket: default_faces_bucket(),
            work_root: std::env::temp_dir(),
            caption_font_path: default_caption_font_path(),
            photo_width: 1080,
            photo_height: 1920,
            fallback_fps: 30.0,
            stderr_limit: 2000,
            video_timeout_secs: default_video_timeout(),
            caption_timeout_secs: default_caption_timeout(),
            faceswap_timeout_secs: default_faceswap_timeout(),
        }
    }
}

impl ProcessingConfig {
    /// Wall-clock ceiling for one job of the given kind.
    pub fn timeout_for(&self, job_type: JobType) -> Duration {
        let secs = match job_type {
            JobType::Video => self.video_timeout_secs,
            JobType::PhotoCaptions => self.caption_timeout_secs,
            JobType::Faceswap => self.faceswap_timeout_secs,
        };
        Duration::from_secs(secs)
    }
}

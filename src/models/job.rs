use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::variant::{CaptionPosition, FontSize, VideoSettings};

/// Lifecycle status of a variant job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Kind tag stored in the `job_type` column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobType {
    Video,
    PhotoCaptions,
    Faceswap,
}

/// What the face swap is applied to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceType {
    Video,
    Image,
}

/// Per-kind job payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    Video {
        #[serde(default)]
        settings: VideoSettings,
    },
    PhotoCaptions {
        captions: Vec<String>,
        #[serde(default)]
        font_size: FontSize,
        #[serde(default)]
        position: CaptionPosition,
    },
    Faceswap {
        face_path: String,
        source_type: SourceType,
        #[serde(default)]
        swap_only: bool,
    },
}

impl JobKind {
    pub fn job_type(&self) -> JobType {
        match self {
            JobKind::Video { .. } => JobType::Video,
            JobKind::PhotoCaptions { .. } => JobType::PhotoCaptions,
            JobKind::Faceswap { .. } => JobType::Faceswap,
        }
    }
}

/// Everything a worker needs to run one job. This is the queue payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSpec {
    pub job_id: Uuid,
    pub user_id: String,
    pub source_path: String,
    #[serde(default)]
    pub variant_count: u32,
    #[serde(flatten)]
    pub kind: JobKind,
}

impl JobSpec {
    /// Number of loop iterations the orchestrator will run.
    pub fn total_variants(&self) -> u32 {
        match &self.kind {
            JobKind::Video { .. } => self.variant_count,
            JobKind::PhotoCaptions { captions, .. } => captions.len() as u32,
            JobKind::Faceswap { swap_only: true, .. } => 1,
            JobKind::Faceswap { .. } => self.variant_count,
        }
    }
}

/// A job row as stored in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub user_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: i32,
    pub variant_count: i32,
    pub variants_completed: i32,
    pub source_file_path: String,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub output_zip_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A partial update written by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub progress: u8,
    pub variants_completed: u32,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output_path: Option<String>,
}

impl JobUpdate {
    pub fn progress(status: JobStatus, progress: u8, variants_completed: u32) -> Self {
        Self {
            status,
            progress,
            variants_completed,
            error_message: None,
            error_code: None,
            completed_at: None,
            output_path: None,
        }
    }
}

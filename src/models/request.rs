use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{JobKind, JobSpec, JobStatus};

/// Upper bound on variants per job.
pub const MAX_VARIANTS: u32 = 100;

/// Body of `POST /api/v1/jobs`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[garde(skip)]
    pub job_id: Uuid,

    #[garde(length(min = 1, max = 200))]
    pub user_id: String,

    #[garde(length(min = 1, max = 1024))]
    pub source_path: String,

    #[garde(range(max = MAX_VARIANTS))]
    #[serde(default)]
    pub variant_count: u32,

    #[garde(custom(validate_kind))]
    #[serde(flatten)]
    pub kind: JobKind,
}

fn validate_kind(kind: &JobKind, _ctx: &()) -> garde::Result {
    match kind {
        JobKind::PhotoCaptions { captions, .. } => {
            if captions.is_empty() || captions.len() > MAX_VARIANTS as usize {
                return Err(garde::Error::new(format!(
                    "captions must contain between 1 and {MAX_VARIANTS} entries"
                )));
            }
            if captions.iter().any(|c| c.trim().is_empty()) {
                return Err(garde::Error::new("captions must not be blank"));
            }
            Ok(())
        }
        JobKind::Faceswap { face_path, .. } if face_path.is_empty() => {
            Err(garde::Error::new("face_path is required"))
        }
        _ => Ok(()),
    }
}

impl CreateJobRequest {
    /// Convert into the queue payload, checking rules that span fields.
    pub fn into_spec(self) -> Result<JobSpec, String> {
        let needs_count = match &self.kind {
            JobKind::Video { .. } => true,
            JobKind::Faceswap { swap_only, .. } => !swap_only,
            JobKind::PhotoCaptions { .. } => false,
        };
        if needs_count && self.variant_count == 0 {
            return Err("variant_count must be at least 1".to_string());
        }

        Ok(JobSpec {
            job_id: self.job_id,
            user_id: self.user_id,
            source_path: self.source_path,
            variant_count: self.variant_count,
            kind: self.kind,
        })
    }
}

/// Acknowledgement returned once a job is queued.
#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub status: String,
    pub job_id: Uuid,
    pub call_id: Uuid,
}

/// Structured client error.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: error.into(),
        }
    }
}

/// Response for `GET /api/v1/jobs/{id}`.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: i32,
    pub variants_completed: i32,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub output_path: Option<String>,
}

//! Error taxonomy for the variant pipeline.
//!
//! Every [`PipelineError`] maps to exactly one [`ErrorClass`], and every class
//! maps to exactly one [`Policy`]. The orchestrator consults the policy table
//! instead of filtering errors case by case.

use strum::{Display, EnumString};

use crate::services::ledger::LedgerError;
use crate::services::models::VisionError;
use crate::services::storage::StorageError;

/// Longest error message written to the ledger.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Coarse classification stored as the job's `error_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorClass {
    #[strum(serialize = "configuration_error")]
    Configuration,
    #[strum(serialize = "input_error")]
    Input,
    #[strum(serialize = "tool_error")]
    ToolExecution,
    #[strum(serialize = "persistence_error")]
    Persistence,
    #[strum(serialize = "final_status_error")]
    FinalStatus,
    #[strum(serialize = "internal_error")]
    Internal,
    #[strum(serialize = "timeout")]
    Timeout,
}

/// What the orchestrator does when an error of a class surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Unwind to the job boundary and fail the job.
    Fatal,
    /// Log, skip the affected artifact, keep going.
    Recoverable,
    /// Log loudly and swallow; the job cannot be updated any further.
    Escalate,
}

impl ErrorClass {
    pub const fn policy(self) -> Policy {
        match self {
            ErrorClass::Configuration => Policy::Fatal,
            ErrorClass::Input => Policy::Fatal,
            ErrorClass::ToolExecution => Policy::Fatal,
            ErrorClass::Internal => Policy::Fatal,
            ErrorClass::Timeout => Policy::Fatal,
            ErrorClass::Persistence => Policy::Recoverable,
            ErrorClass::FinalStatus => Policy::Escalate,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid {field} interval: min {min} is greater than max {max}")]
    InvalidInterval {
        field: &'static str,
        min: String,
        max: String,
    },

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Failed to download {what} from {bucket}/{path}: {source}")]
    Download {
        what: &'static str,
        bucket: String,
        path: String,
        #[source]
        source: StorageError,
    },

    #[error("No face detected in reference image")]
    NoReferenceFace,

    #[error("No frames could be extracted from the source video")]
    NoFramesExtracted,

    #[error("{tool} failed (exit code {code}): {stderr}")]
    Tool {
        tool: &'static str,
        code: i32,
        stderr: String,
    },

    #[error("Failed to launch {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Face model failed: {0}")]
    Vision(#[from] VisionError),

    #[error("Upload failed: {0}")]
    Upload(#[source] StorageError),

    #[error("Ledger write failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Terminal status write failed: {0}")]
    FinalStatus(#[source] LedgerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Archive write failed: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid {from} -> {to} transition")]
    InvalidTransition { from: String, to: String },

    #[error("Job exceeded its {0}s time limit")]
    Timeout(u64),
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::Config(_) | PipelineError::InvalidInterval { .. } => {
                ErrorClass::Configuration
            }
            PipelineError::Input(_)
            | PipelineError::Download { .. }
            | PipelineError::NoReferenceFace
            | PipelineError::NoFramesExtracted => ErrorClass::Input,
            PipelineError::Tool { .. } | PipelineError::Spawn { .. } | PipelineError::Vision(_) => {
                ErrorClass::ToolExecution
            }
            PipelineError::Upload(_) | PipelineError::Ledger(_) => ErrorClass::Persistence,
            PipelineError::FinalStatus(_) => ErrorClass::FinalStatus,
            PipelineError::Io(_)
            | PipelineError::Image(_)
            | PipelineError::Archive(_)
            | PipelineError::InvalidTransition { .. } => ErrorClass::Internal,
            PipelineError::Timeout(_) => ErrorClass::Timeout,
        }
    }

    pub fn policy(&self) -> Policy {
        self.class().policy()
    }

    /// Tag written to the ledger's `error_code` column.
    pub fn error_code(&self) -> String {
        self.class().to_string()
    }

    /// Message written to the ledger, cut to [`MAX_ERROR_MESSAGE_CHARS`].
    pub fn truncated_message(&self) -> String {
        truncate_chars(&self.to_string(), MAX_ERROR_MESSAGE_CHARS)
    }
}

/// Keep at most `limit` characters from the start of `text`.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

/// Keep at most `limit` bytes from the end of `text`, on a char boundary.
/// ffmpeg prints the actual failure last.
pub fn tail_bytes(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.trim_end().to_string();
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", text[start..].trim_end())
}

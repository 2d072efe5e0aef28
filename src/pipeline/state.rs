//! One-directional job lifecycle: `queued -> processing -> {completed, failed}`.
//!
//! Every ledger write the orchestrator issues is produced here, so invalid
//! transitions and backwards progress never reach storage.

use chrono::Utc;
use uuid::Uuid;

use crate::models::job::{JobStatus, JobUpdate};
use crate::pipeline::error::PipelineError;
use crate::pipeline::progress::ProgressTracker;

#[derive(Debug)]
pub struct JobLifecycle {
    job_id: Uuid,
    status: JobStatus,
    progress: ProgressTracker,
    variants_completed: u32,
}

impl JobLifecycle {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            progress: ProgressTracker::new(),
            variants_completed: 0,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress.current()
    }

    pub fn variants_completed(&self) -> u32 {
        self.variants_completed
    }

    pub fn start(&mut self) -> Result<JobUpdate, PipelineError> {
        self.transition(JobStatus::Processing)?;
        Ok(JobUpdate::progress(JobStatus::Processing, 0, 0))
    }

    /// Returns an update only when something observable changed.
    pub fn advance(&mut self, progress: u8, variants_completed: u32) -> Option<JobUpdate> {
        if self.status != JobStatus::Processing {
            return None;
        }
        let moved = self.progress.advance(progress).is_some();
        let delivered = variants_completed > self.variants_completed;
        if delivered {
            self.variants_completed = variants_completed;
        }
        (moved || delivered).then(|| {
            JobUpdate::progress(JobStatus::Processing, self.progress.current(), self.variants_completed)
        })
    }

    /// `output_path` is `None` when the archive never made it to storage.
    pub fn complete(&mut self, output_path: Option<String>) -> Result<JobUpdate, PipelineError> {
        if self.progress.current() != 100 {
            return Err(PipelineError::InvalidTransition {
                from: format!("{} at {}%", self.status, self.progress.current()),
                to: JobStatus::Completed.to_string(),
            });
        }
        self.transition(JobStatus::Completed)?;
        Ok(JobUpdate {
            completed_at: Some(Utc::now()),
            output_path,
            ..JobUpdate::progress(JobStatus::Completed, 100, self.variants_completed)
        })
    }

    pub fn fail(&mut self, error: &PipelineError) -> Result<JobUpdate, PipelineError> {
        self.transition(JobStatus::Failed)?;
        Ok(JobUpdate {
            error_message: Some(error.truncated_message()),
            error_code: Some(error.error_code()),
            ..JobUpdate::progress(JobStatus::Failed, self.progress.current(), self.variants_completed)
        })
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), PipelineError> {
        let allowed = matches!(
            (self.status, to),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        );
        if !allowed {
            return Err(PipelineError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }
}

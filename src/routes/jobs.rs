use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::job::{JobKind, JobStatus, JobUpdate};
use crate::models::request::{CreateJobRequest, CreateJobResponse, ErrorResponse, JobStatusResponse};
use crate::pipeline::sampler::SamplerConfig;
use crate::services::queue::QueuedJob;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message)))
}

fn internal(message: impl Into<String>) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new(message)))
}

/// POST /api/v1/jobs: validate a job description, record it and enqueue it.
pub async fn create_job(
    State(state): State<AppState>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ApiError> {
    let Json(request) = payload.map_err(|rejection| bad_request(rejection.body_text()))?;

    request
        .validate()
        .map_err(|report| bad_request(report.to_string()))?;

    let spec = request.into_spec().map_err(bad_request)?;

    if let JobKind::Video { settings } = &spec.kind {
        SamplerConfig::from_settings(settings).map_err(|e| bad_request(e.to_string()))?;
    }

    let inserted = queries::register_job(&state.db, &spec).await.map_err(|e| {
        tracing::error!(job_id = %spec.job_id, error = %e, "Failed to register job");
        internal("failed to register job")
    })?;
    if !inserted {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(format!("job {} already exists", spec.job_id))),
        ));
    }

    let queued = QueuedJob::new(spec);
    if let Err(e) = state.queue.enqueue(&queued).await {
        tracing::error!(job_id = %queued.spec.job_id, error = %e, "Failed to enqueue job");
        let update = JobUpdate {
            error_message: Some("job could not be queued".to_string()),
            error_code: Some("internal_error".to_string()),
            ..JobUpdate::progress(JobStatus::Failed, 0, 0)
        };
        if let Err(e) = queries::update_job(&state.db, queued.spec.job_id, &update).await {
            tracing::error!(job_id = %queued.spec.job_id, error = %e, "Failed to mark unqueued job as failed");
        }
        return Err(internal("failed to enqueue job"));
    }

    tracing::info!(
        job_id = %queued.spec.job_id,
        call_id = %queued.call_id,
        kind = %queued.spec.kind.job_type(),
        "Job queued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateJobResponse {
            status: "queued".to_string(),
            job_id: queued.spec.job_id,
            call_id: queued.call_id,
        }),
    ))
}

/// GET /api/v1/jobs/{job_id}: current status and progress of a job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = queries::get_job(&state.db, job_id).await.map_err(|e| {
        tracing::error!(job_id = %job_id, error = %e, "Failed to load job");
        internal("failed to load job")
    })?;

    let job = job.ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("job {job_id} not found"))),
        )
    })?;

    Ok(Json(JobStatusResponse {
        job_id: job.id,
        status: job.status,
        progress: job.progress,
        variants_completed: job.variants_completed,
        error: job.error_message,
        error_code: job.error_code,
        output_path: job.output_zip_path,
    }))
}

use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::job::{Job, JobSpec, JobStatus, JobType, JobUpdate};
use crate::models::variant::NewVariant;

/// Register a queued job. An existing row with the same id is left untouched.
pub async fn register_job(pool: &PgPool, spec: &JobSpec) -> Result<bool, sqlx::Error> {
    let settings = serde_json::to_value(&spec.kind)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO jobs (id, user_id, job_type, status, variant_count, settings, source_file_path)
        VALUES ($1, $2, $3, 'queued', $4, $5, $6)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(spec.job_id)
    .bind(&spec.user_id)
    .bind(spec.kind.job_type().to_string())
    .bind(spec.total_variants() as i32)
    .bind(settings)
    .bind(&spec.source_path)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, job_type, status, progress, variant_count, variants_completed,
               source_file_path, error_message, error_code, output_zip_path,
               created_at, updated_at, completed_at
        FROM jobs
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    let Some(r) = row else {
        return Ok(None);
    };

    let status_str: String = r.try_get("status")?;
    let status = JobStatus::from_str(&status_str)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let type_str: String = r.try_get("job_type")?;
    let job_type = JobType::from_str(&type_str)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(Some(Job {
        id: r.try_get("id")?,
        user_id: r.try_get("user_id")?,
        job_type,
        status,
        progress: r.try_get("progress")?,
        variant_count: r.try_get("variant_count")?,
        variants_completed: r.try_get("variants_completed")?,
        source_file_path: r.try_get("source_file_path")?,
        error_message: r.try_get("error_message")?,
        error_code: r.try_get("error_code")?,
        output_zip_path: r.try_get("output_zip_path")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
        completed_at: r.try_get("completed_at")?,
    }))
}

/// Apply an orchestrator update.
///
/// Terminal rows are never touched and progress never moves backwards, so the
/// lifecycle invariants hold even if two writers race. Returns rows affected.
pub async fn update_job(
    pool: &PgPool,
    job_id: Uuid,
    update: &JobUpdate,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = $2,
            progress = GREATEST(progress, $3),
            variants_completed = GREATEST(variants_completed, $4),
            error_message = COALESCE($5, error_message),
            error_code = COALESCE($6, error_code),
            completed_at = COALESCE($7, completed_at),
            output_zip_path = COALESCE($8, output_zip_path),
            started_at = CASE WHEN $2 = 'processing' THEN COALESCE(started_at, NOW()) ELSE started_at END,
            updated_at = NOW()
        WHERE id = $1
          AND status NOT IN ('completed', 'failed')
        "#,
    )
    .bind(job_id)
    .bind(update.status.to_string())
    .bind(i32::from(update.progress))
    .bind(update.variants_completed as i32)
    .bind(update.error_message.as_deref())
    .bind(update.error_code.as_deref())
    .bind(update.completed_at)
    .bind(update.output_path.as_deref())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Insert a variant record
pub async fn insert_variant(pool: &PgPool, variant: &NewVariant) -> Result<Uuid, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO variants (job_id, file_path, file_size, file_hash, transformations)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(variant.job_id)
    .bind(&variant.file_path)
    .bind(variant.file_size)
    .bind(&variant.file_hash)
    .bind(&variant.transformations)
    .fetch_one(pool)
    .await?;

    row.try_get("id")
}

/// Count variants recorded for a job
pub async fn count_variants(pool: &PgPool, job_id: Uuid) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM variants WHERE job_id = $1")
        .bind(job_id)
        .fetch_one(pool)
        .await?;

    row.try_get("n")
}

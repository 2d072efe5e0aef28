use content_variants::{
    config::AppConfig,
    db::{self, queries},
    models::job::{JobKind, JobSpec, JobStatus, JobUpdate},
    models::variant::{NewVariant, VideoSettings},
    services::{
        ledger::{JobLedger, LedgerError, PgLedger},
        queue::{JobQueue, QueuedJob},
        storage::{ObjectStore, R2Client},
    },
};
use uuid::Uuid;

/// Integration test: ledger, queue and storage against real services
///
/// This test verifies:
/// 1. Database connection and schema
/// 2. Job registration and lifecycle updates through `PgLedger`
/// 3. Terminal rows refusing further writes
/// 4. Job queue (enqueue/dequeue/acknowledge)
/// 5. R2 storage (upload/download/delete)
///
/// Note: This requires running PostgreSQL, Redis and R2 credentials
/// configured via environment variables.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_full_integration() {
    let config = AppConfig::from_env().expect("Failed to load config");

    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");

    let spec = JobSpec {
        job_id: Uuid::new_v4(),
        user_id: "integration-user".to_string(),
        source_path: "integration-user/clip.mp4".to_string(),
        variant_count: 2,
        kind: JobKind::Video {
            settings: VideoSettings::default(),
        },
    };

    // 1. Registration is idempotent
    assert!(queries::register_job(&db_pool, &spec).await.expect("Failed to register job"));
    assert!(!queries::register_job(&db_pool, &spec).await.expect("Failed to re-register job"));

    let job = queries::get_job(&db_pool, spec.job_id)
        .await
        .expect("Failed to get job")
        .expect("Job not found");
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.variant_count, 2);

    // 2. Progress never moves backwards
    let ledger = PgLedger::new(db_pool.clone());
    ledger
        .update_job(spec.job_id, &JobUpdate::progress(JobStatus::Processing, 60, 1))
        .await
        .expect("Failed to update progress");
    ledger
        .update_job(spec.job_id, &JobUpdate::progress(JobStatus::Processing, 40, 1))
        .await
        .expect("Failed to update progress");

    let job = queries::get_job(&db_pool, spec.job_id)
        .await
        .expect("Failed to get job")
        .expect("Job not found");
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.progress, 60);

    // 3. Variant rows
    ledger
        .insert_variant(&NewVariant {
            job_id: spec.job_id,
            file_path: format!("integration-user/{}/variant_001.mp4", spec.job_id),
            file_size: 1024,
            file_hash: "ab".repeat(32),
            transformations: serde_json::json!({ "brightness": 0.01 }),
        })
        .await
        .expect("Failed to insert variant");
    assert_eq!(
        queries::count_variants(&db_pool, spec.job_id)
            .await
            .expect("Failed to count variants"),
        1
    );

    // 4. Completion is final
    let done = JobUpdate {
        completed_at: Some(chrono::Utc::now()),
        output_path: Some(format!("integration-user/{}/variants.zip", spec.job_id)),
        ..JobUpdate::progress(JobStatus::Completed, 100, 1)
    };
    ledger
        .update_job(spec.job_id, &done)
        .await
        .expect("Failed to complete job");

    let late = ledger
        .update_job(spec.job_id, &JobUpdate::progress(JobStatus::Failed, 100, 1))
        .await;
    assert!(matches!(late, Err(LedgerError::Rejected(id)) if id == spec.job_id));

    let final_job = queries::get_job(&db_pool, spec.job_id)
        .await
        .expect("Failed to get job")
        .expect("Job not found");
    assert_eq!(final_job.status, JobStatus::Completed);
    assert!(final_job.completed_at.is_some());
    assert!(final_job.output_zip_path.is_some());

    // 5. Queue operations
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize queue");
    let queued = QueuedJob::new(spec.clone());
    queue.enqueue(&queued).await.expect("Failed to enqueue");

    let (dequeued, payload) = queue
        .dequeue()
        .await
        .expect("Failed to dequeue")
        .expect("No job in queue");
    assert_eq!(dequeued.call_id, queued.call_id);
    assert_eq!(dequeued.spec, spec);
    queue.complete(&payload).await.expect("Failed to acknowledge job");

    // 6. R2 round trip
    let storage = R2Client::new(
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
    )
    .expect("Failed to initialize R2");

    let key = format!("integration-user/{}/probe.bin", Uuid::new_v4());
    let data = b"variant bytes".to_vec();
    storage
        .upload(&config.output_bucket, &key, &data, "application/octet-stream")
        .await
        .expect("R2 upload failed");
    let downloaded = storage
        .download(&config.output_bucket, &key)
        .await
        .expect("R2 download failed");
    assert_eq!(downloaded, data);

    storage
        .delete(&config.output_bucket, &key)
        .await
        .expect("Failed to delete test object");
}

/// Queue payloads survive serialization with the flattened job kind
#[test]
fn test_queue_payload_shape() {
    let queued = QueuedJob::new(JobSpec {
        job_id: Uuid::new_v4(),
        user_id: "u".to_string(),
        source_path: "u/photo.jpg".to_string(),
        variant_count: 0,
        kind: JobKind::PhotoCaptions {
            captions: vec!["hello".to_string()],
            font_size: Default::default(),
            position: Default::default(),
        },
    });

    let payload = serde_json::to_value(&queued).expect("Failed to serialize");
    assert_eq!(payload["spec"]["kind"], "photo_captions");
    assert_eq!(payload["spec"]["font_size"], "medium");
    assert_eq!(payload["spec"]["position"], "center");

    let back: QueuedJob = serde_json::from_value(payload).expect("Failed to deserialize");
    assert_eq!(back.spec, queued.spec);
}

use content_variants::{
    config::AppConfig,
    db,
    models::job::{JobStatus, JobUpdate},
    pipeline::{ffmpeg::FfmpegCli, PipelineError, VariantOrchestrator},
    services::{
        ledger::{JobLedger, PgLedger},
        models::RemoteModelLoader,
        queue::{JobQueue, QueuedJob},
        storage::R2Client,
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

struct Worker {
    queue: JobQueue,
    ledger: Arc<PgLedger>,
    orchestrator: VariantOrchestrator,
}

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting variant worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let metrics_addr: SocketAddr = config
        .metrics_addr
        .parse()
        .expect("METRICS_ADDR must be a socket address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus exporter");
    describe_metrics();

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Initializing services");
    let storage = R2Client::new(
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
    )
    .expect("Failed to initialize R2 client");

    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");
    let ledger = Arc::new(PgLedger::new(db_pool));
    let processing = config.processing();

    let orchestrator = VariantOrchestrator::new(
        Arc::new(storage),
        ledger.clone(),
        Arc::new(FfmpegCli::new(
            config.ffmpeg_bin.clone(),
            config.ffprobe_bin.clone(),
            processing.stderr_limit,
        )),
        Arc::new(RemoteModelLoader::new(&config.model_server_url)),
        processing,
    );

    let worker = Worker {
        queue,
        ledger,
        orchestrator,
    };

    tracing::info!("Worker ready, starting job processing loop");

    loop {
        match worker.process_next_job().await {
            Ok(true) => {
                tracing::debug!("Job processed, checking for next job");
            }
            Ok(false) => {
                tracing::trace!("No jobs available, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Queue error");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

fn describe_metrics() {
    metrics::describe_counter!("variant_jobs_total", "Jobs picked up by this worker");
    metrics::describe_counter!("variant_jobs_completed", "Jobs that reached completed");
    metrics::describe_counter!("variant_jobs_failed", "Jobs that reached failed");
    metrics::describe_counter!("variant_artifacts_persisted", "Variants uploaded and recorded");
    metrics::describe_counter!("variant_persist_failures", "Variant uploads or ledger writes that failed");
    metrics::describe_counter!("variant_duplicate_hashes", "Variants byte-identical to an earlier one");
    metrics::describe_counter!("faceswap_frames_total", "Video frames passed through face swap");
    metrics::describe_histogram!("variant_job_seconds", "Wall-clock time per job");
}

impl Worker {
    /// Run the next queued job. Returns Ok(false) when the queue is empty.
    ///
    /// Every dequeued job is acknowledged once it has run, whatever the
    /// outcome. Failed jobs are not retried.
    async fn process_next_job(&self) -> Result<bool, Box<dyn std::error::Error>> {
        let (job, payload) = match self.queue.dequeue().await? {
            Some(next) => next,
            None => return Ok(false),
        };

        self.run(&job).await;
        self.queue.complete(&payload).await?;
        Ok(true)
    }

    async fn run(&self, job: &QueuedJob) {
        let spec = &job.spec;
        let limit = self.orchestrator.config().timeout_for(spec.kind.job_type());

        tracing::info!(
            job_id = %spec.job_id,
            call_id = %job.call_id,
            timeout_secs = limit.as_secs(),
            "Processing job"
        );

        match tokio::time::timeout(limit, self.orchestrator.run_job(spec)).await {
            Ok(Ok(outcome)) => {
                tracing::info!(
                    job_id = %spec.job_id,
                    variants_completed = outcome.variants_completed,
                    output = ?outcome.output_path,
                    "Job finished"
                );
            }
            Ok(Err(e)) => {
                // Already recorded as failed by the orchestrator.
                tracing::warn!(job_id = %spec.job_id, error_code = %e.error_code(), "Job finished with failure");
            }
            Err(_) => {
                let err = PipelineError::Timeout(limit.as_secs());
                tracing::error!(job_id = %spec.job_id, error = %err, "Job timed out");
                metrics::counter!("variant_jobs_failed", "kind" => spec.kind.job_type().to_string())
                    .increment(1);

                let update = JobUpdate {
                    error_message: Some(err.truncated_message()),
                    error_code: Some(err.error_code()),
                    ..JobUpdate::progress(JobStatus::Failed, 0, 0)
                };
                if let Err(e) = self.ledger.update_job(spec.job_id, &update).await {
                    tracing::error!(
                        job_id = %spec.job_id,
                        error = %e,
                        "CRITICAL: failed to record timeout, job left in processing"
                    );
                }
            }
        }
    }
}

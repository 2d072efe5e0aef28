//! Runs one job end to end: download, transform, persist, archive, report.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;
use serde_json::json;
use uuid::Uuid;

use crate::config::ProcessingConfig;
use crate::models::job::{JobKind, JobSpec, JobUpdate, SourceType};
use crate::models::variant::{
    variant_name, CaptionPosition, CaptionStyle, FontSize, NewVariant, TransformParams,
    VariantArtifact, VideoSettings,
};
use crate::pipeline::archive::{build_archive, ARCHIVE_NAME};
use crate::pipeline::captions::CaptionRenderer;
use crate::pipeline::command::{self, FilterOptions};
use crate::pipeline::error::{PipelineError, Policy};
use crate::pipeline::ffmpeg::MediaTool;
use crate::pipeline::frames::{self, FramePipeline};
use crate::pipeline::hashing::{content_hash, UniquenessTracker};
use crate::pipeline::progress::{Phase, PhaseLayout};
use crate::pipeline::raster::{self, PhotoFinish, DEFAULT_JPEG_QUALITY};
use crate::pipeline::sampler::{SamplerConfig, TransformSampler};
use crate::pipeline::state::JobLifecycle;
use crate::pipeline::workdir::WorkDir;
use crate::services::ledger::JobLedger;
use crate::services::models::{DetectedFace, ModelLoader, ModelSet};
use crate::services::storage::ObjectStore;

const VIDEO_CONTENT_TYPE: &str = "video/mp4";
const IMAGE_CONTENT_TYPE: &str = "image/jpeg";
const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Summary of a finished job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub variants_completed: u32,
    /// `None` when the archive could not be uploaded.
    pub output_path: Option<String>,
    pub duplicates: u32,
}

pub struct VariantOrchestrator {
    storage: Arc<dyn ObjectStore>,
    ledger: Arc<dyn JobLedger>,
    tool: Arc<dyn MediaTool>,
    models: Arc<dyn ModelLoader>,
    config: ProcessingConfig,
}

/// Mutable state of one run.
struct RunContext<'a> {
    spec: &'a JobSpec,
    lifecycle: JobLifecycle,
    workdir: &'a WorkDir,
    delivered: Vec<VariantArtifact>,
    hashes: UniquenessTracker,
    duplicates: u32,
}

impl RunContext<'_> {
    fn object_path(&self, name: &str) -> String {
        format!("{}/{}/{name}", self.spec.user_id, self.spec.job_id)
    }
}

impl VariantOrchestrator {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        ledger: Arc<dyn JobLedger>,
        tool: Arc<dyn MediaTool>,
        models: Arc<dyn ModelLoader>,
        config: ProcessingConfig,
    ) -> Self {
        Self {
            storage,
            ledger,
            tool,
            models,
            config,
        }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Run `spec` to a terminal state.
    ///
    /// Any error is written to the ledger as `failed` and then returned. The
    /// job's working directory is removed on every path.
    pub async fn run_job(&self, spec: &JobSpec) -> Result<JobOutcome, PipelineError> {
        let started = Instant::now();
        let kind = spec.kind.job_type().to_string();
        metrics::counter!("variant_jobs_total", "kind" => kind.clone()).increment(1);

        tracing::info!(
            job_id = %spec.job_id,
            kind = %kind,
            variants = spec.total_variants(),
            "Starting variant job"
        );

        let mut lifecycle = JobLifecycle::new(spec.job_id);

        let workdir = match WorkDir::create(&self.config.work_root, spec.job_id) {
            Ok(dir) => dir,
            Err(e) => {
                self.record_failure(&mut lifecycle, &e).await;
                metrics::counter!("variant_jobs_failed", "kind" => kind).increment(1);
                return Err(e);
            }
        };

        let mut ctx = RunContext {
            spec,
            lifecycle,
            workdir: &workdir,
            delivered: Vec::new(),
            hashes: UniquenessTracker::new(),
            duplicates: 0,
        };

        let result = self.execute(&mut ctx).await;

        let outcome = match result {
            Ok(outcome) => {
                metrics::counter!("variant_jobs_completed", "kind" => kind.clone()).increment(1);
                tracing::info!(
                    job_id = %spec.job_id,
                    variants_completed = outcome.variants_completed,
                    duplicates = outcome.duplicates,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Variant job completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(
                    job_id = %spec.job_id,
                    error = %e,
                    error_code = %e.error_code(),
                    "Variant job failed"
                );
                self.record_failure(&mut ctx.lifecycle, &e).await;
                metrics::counter!("variant_jobs_failed", "kind" => kind.clone()).increment(1);
                Err(e)
            }
        };

        drop(ctx);
        workdir.release();
        metrics::histogram!("variant_job_seconds", "kind" => kind)
            .record(started.elapsed().as_secs_f64());
        outcome
    }

    async fn execute(&self, ctx: &mut RunContext<'_>) -> Result<JobOutcome, PipelineError> {
        let update = ctx.lifecycle.start()?;
        self.write_progress(ctx.spec, &update).await?;

        let spec = ctx.spec;
        match &spec.kind {
            JobKind::Video { settings } => self.run_video(ctx, settings).await?,
            JobKind::PhotoCaptions {
                captions,
                font_size,
                position,
            } => self.run_captions(ctx, captions, *font_size, *position).await?,
            JobKind::Faceswap {
                face_path,
                source_type,
                swap_only,
            } => self.run_faceswap(ctx, face_path, *source_type, *swap_only).await?,
        }

        let job_id = ctx.spec.job_id;
        let archive = build_archive(&ctx.delivered)?;
        let archive_path = ctx.object_path(ARCHIVE_NAME);
        let output_path = match self
            .storage
            .upload(&self.config.output_bucket, &archive_path, &archive, ZIP_CONTENT_TYPE)
            .await
        {
            Ok(()) => Some(archive_path),
            Err(e) => {
                apply_policy(
                    job_id,
                    PipelineError::Upload(e),
                    "Archive upload failed, completing without an output path",
                )?;
                None
            }
        };

        let delivered = ctx.delivered.len() as u32;
        if let Some(update) = ctx.lifecycle.advance(100, delivered) {
            self.write_progress(ctx.spec, &update).await?;
        }

        let update = ctx.lifecycle.complete(output_path.clone())?;
        if let Err(e) = self.ledger.update_job(job_id, &update).await {
            apply_policy(
                job_id,
                PipelineError::FinalStatus(e),
                "Failed to record completed status, job left in processing",
            )?;
        }

        Ok(JobOutcome {
            variants_completed: delivered,
            output_path,
            duplicates: ctx.duplicates,
        })
    }

    async fn run_video(
        &self,
        ctx: &mut RunContext<'_>,
        settings: &VideoSettings,
    ) -> Result<(), PipelineError> {
        let sampler = TransformSampler::new(SamplerConfig::from_settings(settings)?);
        let input = self
            .fetch_to_file(ctx, &self.config.source_bucket, "source video", "input")
            .await?;

        let options = FilterOptions {
            remove_watermark: settings.remove_watermark,
            noise_strength: settings.noise_strength,
            source_size: None,
        };
        let count = ctx.spec.variant_count;
        self.video_variants(ctx, &input, &sampler, options, count, PhaseLayout::SINGLE_LOOP.variants)
            .await
    }

    /// Transform `input` `count` times through the command builder.
    async fn video_variants(
        &self,
        ctx: &mut RunContext<'_>,
        input: &Path,
        sampler: &TransformSampler,
        mut options: FilterOptions,
        count: u32,
        phase: Phase,
    ) -> Result<(), PipelineError> {
        let probe = self.tool.probe(input).await?;
        options.source_size = probe.dimensions();

        let draws = sampler.sample_many(count);
        for (i, params) in draws.iter().enumerate() {
            let index = i as u32 + 1;
            let chain = command::build_filter_chain(params, &options)?;
            let name = variant_name("variant", index, "mp4");
            let output = ctx.workdir.file(&name);

            tracing::debug!(job_id = %ctx.spec.job_id, variant = index, filters = %chain.video, "Rendering variant");
            self.tool
                .run(&command::variant_args(input, &output, &chain))
                .await?;

            let bytes = tokio::fs::read(&output).await?;
            let artifact = make_artifact(index, name, bytes, VIDEO_CONTENT_TYPE, json!(params));
            self.persist(ctx, artifact).await?;
            self.report_loop(ctx, phase, index, count).await?;
        }
        Ok(())
    }

    async fn run_captions(
        &self,
        ctx: &mut RunContext<'_>,
        captions: &[String],
        font_size: FontSize,
        position: CaptionPosition,
    ) -> Result<(), PipelineError> {
        let renderer = CaptionRenderer::load(&self.config.caption_font_path)?;
        let source = self.fetch_image(ctx, &self.config.source_bucket, "source image").await?;
        let base = raster::fill_and_crop(&source, self.config.photo_width, self.config.photo_height)
            .to_rgb8();
        let style = CaptionStyle {
            font_size,
            position,
        };

        let sampler = TransformSampler::new(SamplerConfig::photo());
        let draws: Vec<TransformParams> = {
            let mut rng = rand::rng();
            captions
                .iter()
                .map(|_| sampler.sample_with_caption(&mut rng, style))
                .collect()
        };

        let total = captions.len() as u32;
        for (i, (caption, params)) in captions.iter().zip(&draws).enumerate() {
            let index = i as u32 + 1;
            let mut canvas = base.clone();
            renderer.render(&mut canvas, caption, style);
            let bytes = photo_variant(&DynamicImage::ImageRgb8(canvas), params)?;

            let mut metadata = json!(params);
            if let Some(meta) = metadata.as_object_mut() {
                meta.insert("caption".to_string(), json!(caption));
            }
            let name = variant_name("variant", index, "jpg");
            let artifact = make_artifact(index, name, bytes, IMAGE_CONTENT_TYPE, metadata);
            self.persist(ctx, artifact).await?;
            self.report_loop(ctx, PhaseLayout::SINGLE_LOOP.variants, index, total)
                .await?;
        }
        Ok(())
    }

    async fn run_faceswap(
        &self,
        ctx: &mut RunContext<'_>,
        face_path: &str,
        source_type: SourceType,
        swap_only: bool,
    ) -> Result<(), PipelineError> {
        let face_bytes = self
            .download(&self.config.faces_bucket, face_path, "reference face")
            .await?;
        let face_image = image::load_from_memory(&face_bytes)?;

        let models = self.models.load().await?;
        let reference = frames::reference_face(&models, &face_image).await?;

        match source_type {
            SourceType::Video => self.faceswap_video(ctx, &models, reference, swap_only).await,
            SourceType::Image => self.faceswap_image(ctx, &models, &reference, swap_only).await,
        }
    }

    async fn faceswap_video(
        &self,
        ctx: &mut RunContext<'_>,
        models: &ModelSet,
        reference: DetectedFace,
        swap_only: bool,
    ) -> Result<(), PipelineError> {
        let layout = PhaseLayout::FACESWAP;
        let input = self
            .fetch_to_file(ctx, &self.config.source_bucket, "source video", "input")
            .await?;

        let mut pipeline = FramePipeline::new(
            self.tool.as_ref(),
            models,
            reference,
            ctx.workdir.path(),
            self.config.fallback_fps,
        );

        let frame_count = pipeline.extract(&input).await?;
        self.report(ctx, layout.extraction.end).await?;

        // Reassembly is counted as one extra step of the swap phase.
        let steps = u64::from(frame_count) + 1;
        for index in 1..=frame_count {
            pipeline.swap_frame(index).await?;
            let value = layout.swap.at(u64::from(index), steps);
            self.report(ctx, value).await?;
        }

        let swapped = ctx.workdir.file("swapped.mp4");
        pipeline.reassemble(&input, &swapped).await?;
        self.report(ctx, layout.swap.end).await?;

        if swap_only {
            let bytes = tokio::fs::read(&swapped).await?;
            let name = variant_name("faceswap", 1, "mp4");
            let stats = pipeline.stats();
            let metadata = json!({
                "swap_only": true,
                "frames": stats.frame_count,
                "faceless_frames": stats.faceless_frames,
                "fps": stats.fps,
                "has_audio": stats.has_audio,
            });
            let artifact = make_artifact(1, name, bytes, VIDEO_CONTENT_TYPE, metadata);
            self.persist(ctx, artifact).await?;
            self.report_loop(ctx, layout.variants, 1, 1).await?;
            return Ok(());
        }

        let sampler = TransformSampler::new(SamplerConfig::default());
        let count = ctx.spec.variant_count;
        self.video_variants(ctx, &swapped, &sampler, FilterOptions::default(), count, layout.variants)
            .await
    }

    async fn faceswap_image(
        &self,
        ctx: &mut RunContext<'_>,
        models: &ModelSet,
        reference: &DetectedFace,
        swap_only: bool,
    ) -> Result<(), PipelineError> {
        let layout = PhaseLayout::FACESWAP;
        let source = self.fetch_image(ctx, &self.config.source_bucket, "source image").await?;
        self.report(ctx, layout.extraction.end).await?;

        let swapped = frames::swap_largest(models, &source, reference)
            .await?
            .ok_or_else(|| PipelineError::Input("no face detected in source image".to_string()))?;
        self.report(ctx, layout.swap.end).await?;

        if swap_only {
            let bytes = raster::encode_clean_jpeg(&swapped.to_rgb8(), DEFAULT_JPEG_QUALITY)?;
            let name = variant_name("faceswap", 1, "jpg");
            let artifact = make_artifact(1, name, bytes, IMAGE_CONTENT_TYPE, json!({ "swap_only": true }));
            self.persist(ctx, artifact).await?;
            self.report_loop(ctx, layout.variants, 1, 1).await?;
            return Ok(());
        }

        let sampler = TransformSampler::new(SamplerConfig::photo());
        let count = ctx.spec.variant_count;
        for (i, params) in sampler.sample_many(count).iter().enumerate() {
            let index = i as u32 + 1;
            let bytes = photo_variant(&swapped, params)?;
            let name = variant_name("variant", index, "jpg");
            let artifact = make_artifact(index, name, bytes, IMAGE_CONTENT_TYPE, json!(params));
            self.persist(ctx, artifact).await?;
            self.report_loop(ctx, layout.variants, index, count).await?;
        }
        Ok(())
    }

    /// Upload and record one artifact. What a failure does is up to
    /// [`apply_policy`]; a skipped artifact is left out of the archive.
    async fn persist(
        &self,
        ctx: &mut RunContext<'_>,
        mut artifact: VariantArtifact,
    ) -> Result<(), PipelineError> {
        let job_id = ctx.spec.job_id;

        if let Some(first) = ctx.hashes.record(&artifact.content_hash, artifact.index) {
            ctx.duplicates += 1;
            metrics::counter!("variant_duplicate_hashes").increment(1);
            tracing::warn!(
                job_id = %job_id,
                variant = artifact.index,
                duplicate_of = first,
                hash = %artifact.content_hash,
                "Variant is byte-identical to an earlier one"
            );
            if let Some(meta) = artifact.metadata.as_object_mut() {
                meta.insert("duplicate_of".to_string(), json!(first));
            }
        }

        let path = ctx.object_path(&artifact.name);
        if let Err(e) = self
            .storage
            .upload(&self.config.output_bucket, &path, &artifact.bytes, artifact.content_type)
            .await
        {
            metrics::counter!("variant_persist_failures").increment(1);
            return apply_policy(
                job_id,
                PipelineError::Upload(e),
                &format!("Skipping variant {} after upload failure", artifact.index),
            );
        }

        let row = NewVariant {
            job_id,
            file_path: path,
            file_size: artifact.size() as i64,
            file_hash: artifact.content_hash.clone(),
            transformations: artifact.metadata.clone(),
        };
        if let Err(e) = self.ledger.insert_variant(&row).await {
            metrics::counter!("variant_persist_failures").increment(1);
            apply_policy(
                job_id,
                PipelineError::Ledger(e),
                &format!("Variant {} uploaded but its ledger row was not written", artifact.index),
            )?;
        }

        metrics::counter!("variant_artifacts_persisted").increment(1);
        tracing::info!(
            job_id = %job_id,
            variant = artifact.index,
            size = artifact.size(),
            hash = %artifact.content_hash,
            "Variant persisted"
        );
        ctx.delivered.push(artifact);
        Ok(())
    }

    async fn report_loop(
        &self,
        ctx: &mut RunContext<'_>,
        phase: Phase,
        done: u32,
        total: u32,
    ) -> Result<(), PipelineError> {
        let value = phase.at(u64::from(done), u64::from(total));
        self.report(ctx, value).await
    }

    async fn report(&self, ctx: &mut RunContext<'_>, progress: u8) -> Result<(), PipelineError> {
        let delivered = ctx.delivered.len() as u32;
        if let Some(update) = ctx.lifecycle.advance(progress, delivered) {
            tracing::debug!(job_id = %ctx.spec.job_id, progress, "Progress");
            self.write_progress(ctx.spec, &update).await?;
        }
        Ok(())
    }

    async fn write_progress(&self, spec: &JobSpec, update: &JobUpdate) -> Result<(), PipelineError> {
        match self.ledger.update_job(spec.job_id, update).await {
            Ok(()) => Ok(()),
            Err(e) => apply_policy(spec.job_id, PipelineError::Ledger(e), "Progress update not recorded"),
        }
    }

    async fn record_failure(&self, lifecycle: &mut JobLifecycle, error: &PipelineError) {
        let job_id = lifecycle.job_id();
        let update = match lifecycle.fail(error) {
            Ok(update) => update,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job already terminal, failure not recorded");
                return;
            }
        };
        if let Err(e) = self.ledger.update_job(job_id, &update).await {
            // Already unwinding with `error`; a fatal verdict here has nowhere to go.
            let _ = apply_policy(
                job_id,
                PipelineError::FinalStatus(e),
                &format!("Failed to record failed status ({error}), job left in processing"),
            );
        }
    }

    async fn download(
        &self,
        bucket: &str,
        path: &str,
        what: &'static str,
    ) -> Result<Vec<u8>, PipelineError> {
        self.storage
            .download(bucket, path)
            .await
            .map_err(|source| PipelineError::Download {
                what,
                bucket: bucket.to_string(),
                path: path.to_string(),
                source,
            })
    }

    async fn fetch_to_file(
        &self,
        ctx: &RunContext<'_>,
        bucket: &str,
        what: &'static str,
        stem: &str,
    ) -> Result<PathBuf, PipelineError> {
        let bytes = self.download(bucket, &ctx.spec.source_path, what).await?;
        let extension = Path::new(&ctx.spec.source_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let path = ctx.workdir.file(&format!("{stem}.{extension}"));
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }

    async fn fetch_image(
        &self,
        ctx: &RunContext<'_>,
        bucket: &str,
        what: &'static str,
    ) -> Result<DynamicImage, PipelineError> {
        let bytes = self.download(bucket, &ctx.spec.source_path, what).await?;
        image::load_from_memory(&bytes)
            .map_err(|e| PipelineError::Input(format!("{what} {} is not a readable image: {e}", ctx.spec.source_path)))
    }
}

/// Route an error raised while persisting through the policy table.
///
/// Fatal errors come back to unwind the run. Recoverable ones are logged and
/// the step is skipped. Escalated ones are logged as `CRITICAL` and swallowed.
fn apply_policy(job_id: Uuid, err: PipelineError, what: &str) -> Result<(), PipelineError> {
    match err.policy() {
        Policy::Fatal => Err(err),
        Policy::Recoverable => {
            tracing::warn!(job_id = %job_id, error = %err, policy = ?Policy::Recoverable, "{what}");
            Ok(())
        }
        Policy::Escalate => {
            tracing::error!(job_id = %job_id, error = %err, policy = ?Policy::Escalate, "CRITICAL: {what}");
            Ok(())
        }
    }
}

fn make_artifact(
    index: u32,
    name: String,
    bytes: Vec<u8>,
    content_type: &'static str,
    metadata: serde_json::Value,
) -> VariantArtifact {
    VariantArtifact {
        index,
        name,
        content_hash: content_hash(&bytes),
        bytes,
        content_type,
        metadata,
    }
}

fn photo_variant(image: &DynamicImage, params: &TransformParams) -> Result<Vec<u8>, PipelineError> {
    let finish = PhotoFinish::from_seed(params.noise_seed);
    let augmented = raster::augment(image, params, &finish);
    Ok(raster::encode_clean_jpeg(&augmented, finish.jpeg_quality)?)
}

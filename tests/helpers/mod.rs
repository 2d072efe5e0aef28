//! In-memory stand-ins for storage, ledger, ffmpeg and the face models.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use content_variants::config::ProcessingConfig;
use content_variants::models::job::{JobStatus, JobUpdate};
use content_variants::models::variant::NewVariant;
use content_variants::pipeline::ffmpeg::{MediaTool, ProbeData};
use content_variants::pipeline::{PipelineError, VariantOrchestrator};
use content_variants::services::ledger::{JobLedger, LedgerError};
use content_variants::services::models::{
    BoundingBox, DetectedFace, FaceDetector, FaceEnhancer, FaceSwapper, ModelLoader, ModelSet,
    VisionError,
};
use content_variants::services::storage::{ObjectStore, StorageError};

// ---------------------------------------------------------------------------
// Object storage

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(String, String), (Vec<u8>, String)>>,
    failing_suffixes: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn put(&self, bucket: &str, path: &str, data: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), path.to_string()), (data, String::new()));
    }

    pub fn get(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), path.to_string()))
            .map(|(data, _)| data.clone())
    }

    pub fn content_type(&self, bucket: &str, path: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), path.to_string()))
            .map(|(_, ct)| ct.clone())
    }

    /// Make every upload whose path ends with `suffix` fail.
    pub fn fail_uploads_ending_with(&self, suffix: &str) {
        self.failing_suffixes.lock().unwrap().insert(suffix.to_string());
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, StorageError> {
        self.get(bucket, path).ok_or(StorageError::Status {
            code: 404,
            path: path.to_string(),
        })
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        let failing = self
            .failing_suffixes
            .lock()
            .unwrap()
            .iter()
            .any(|s| path.ends_with(s.as_str()));
        if failing {
            return Err(StorageError::Status {
                code: 503,
                path: path.to_string(),
            });
        }
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), path.to_string()),
            (data.to_vec(), content_type.to_string()),
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ledger

#[derive(Default)]
pub struct RecordingLedger {
    pub updates: Mutex<Vec<(Uuid, JobUpdate)>>,
    pub variants: Mutex<Vec<NewVariant>>,
    fail_status: Mutex<Option<JobStatus>>,
    fail_inserts: Mutex<bool>,
}

impl RecordingLedger {
    /// Refuse writes that move a job into `status`.
    pub fn fail_writes_with_status(&self, status: JobStatus) {
        *self.fail_status.lock().unwrap() = Some(status);
    }

    /// Refuse every variant row.
    pub fn fail_variant_inserts(&self) {
        *self.fail_inserts.lock().unwrap() = true;
    }

    pub fn updates(&self) -> Vec<JobUpdate> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .map(|(_, u)| u.clone())
            .collect()
    }

    pub fn last_update(&self) -> JobUpdate {
        self.updates().last().cloned().expect("no ledger updates recorded")
    }

    pub fn variants(&self) -> Vec<NewVariant> {
        self.variants.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobLedger for RecordingLedger {
    async fn update_job(&self, job_id: Uuid, update: &JobUpdate) -> Result<(), LedgerError> {
        if *self.fail_status.lock().unwrap() == Some(update.status) {
            return Err(LedgerError::Database(sqlx::Error::PoolTimedOut));
        }
        self.updates.lock().unwrap().push((job_id, update.clone()));
        Ok(())
    }

    async fn insert_variant(&self, variant: &NewVariant) -> Result<(), LedgerError> {
        if *self.fail_inserts.lock().unwrap() {
            return Err(LedgerError::Database(sqlx::Error::PoolTimedOut));
        }
        self.variants.lock().unwrap().push(variant.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ffmpeg

/// Pretends to be ffmpeg by recognizing the three invocation shapes.
///
/// * extraction writes `frames` PNGs, odd frames carry a face;
/// * reassembly writes `frames=N fps=R` for the frames it found;
/// * a variant encode writes its arguments minus the output path, so
///   identical transforms give identical bytes.
pub struct ScriptedTool {
    pub frames: u32,
    pub fail_variants: bool,
    pub calls: Mutex<Vec<Vec<String>>>,
    pub probe_json: String,
}

impl ScriptedTool {
    pub fn new(frames: u32) -> Self {
        Self {
            frames,
            fail_variants: false,
            calls: Mutex::new(Vec::new()),
            probe_json: r#"{
                "streams": [
                    {"codec_type": "video", "width": 1080, "height": 1920, "r_frame_rate": "30/1"},
                    {"codec_type": "audio"}
                ],
                "format": {"duration": "2.0"}
            }"#
            .to_string(),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn extraction_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|args| args.iter().any(|a| a == "-fps_mode"))
            .count()
    }
}

#[async_trait]
impl MediaTool for ScriptedTool {
    async fn run(&self, args: &[String]) -> Result<(), PipelineError> {
        self.calls.lock().unwrap().push(args.to_vec());
        let output = PathBuf::from(args.last().expect("ffmpeg called without output"));

        if args.iter().any(|a| a == "-fps_mode") {
            for i in 1..=self.frames {
                let path = output.to_string_lossy().replace("%06d", &format!("{i:06}"));
                let color = if i % 2 == 1 { FACE } else { BACKGROUND };
                std::fs::write(path, png_bytes(color))?;
            }
            return Ok(());
        }

        if let Some(pos) = args.iter().position(|a| a == "-framerate") {
            let fps = &args[pos + 1];
            let input_at = args.iter().position(|a| a == "-i").expect("no input");
            let frames_dir = Path::new(&args[input_at + 1]).parent().unwrap().to_path_buf();
            let count = std::fs::read_dir(frames_dir)?.count();
            std::fs::write(output, format!("frames={count} fps={fps}"))?;
            return Ok(());
        }

        if self.fail_variants {
            return Err(PipelineError::Tool {
                tool: "ffmpeg",
                code: 1,
                stderr: "Error initializing filter 'eq'".to_string(),
            });
        }
        std::fs::write(&output, args[..args.len() - 1].join(" "))?;
        Ok(())
    }

    async fn probe(&self, _path: &Path) -> Result<ProbeData, PipelineError> {
        Ok(serde_json::from_str(&self.probe_json).expect("bad canned probe"))
    }
}

// ---------------------------------------------------------------------------
// Face models

/// Pixel color the fake detector treats as a face.
pub const FACE: Rgb<u8> = Rgb([230, 30, 30]);
pub const BACKGROUND: Rgb<u8> = Rgb([90, 90, 90]);
/// Color the fake swapper paints over the whole frame.
pub const SWAPPED: Rgb<u8> = Rgb([30, 200, 30]);

pub fn png_bytes(color: Rgb<u8>) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, color));
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

#[derive(Default)]
pub struct ModelCalls {
    pub loads: AtomicUsize,
    pub detections: AtomicUsize,
    pub swaps: AtomicUsize,
    pub enhancements: AtomicUsize,
}

impl ModelCalls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

struct ColorDetector(Arc<ModelCalls>);
struct PaintSwapper(Arc<ModelCalls>);
struct NoopEnhancer(Arc<ModelCalls>);

#[async_trait]
impl FaceDetector for ColorDetector {
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<DetectedFace>, VisionError> {
        self.0.detections.fetch_add(1, Ordering::SeqCst);
        if image.get_pixel(0, 0).0[..3] != FACE.0 {
            return Ok(Vec::new());
        }
        let (w, h) = image.dimensions();
        Ok(vec![DetectedFace {
            bbox: BoundingBox {
                x1: 0.0,
                y1: 0.0,
                x2: w as f32,
                y2: h as f32,
            },
            score: 0.99,
            embedding: vec![0.1, 0.2],
            landmarks: Vec::new(),
        }])
    }
}

#[async_trait]
impl FaceSwapper for PaintSwapper {
    async fn swap(
        &self,
        image: &DynamicImage,
        _target: &DetectedFace,
        _reference: &DetectedFace,
    ) -> Result<DynamicImage, VisionError> {
        self.0.swaps.fetch_add(1, Ordering::SeqCst);
        let (w, h) = image.dimensions();
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, SWAPPED)))
    }
}

#[async_trait]
impl FaceEnhancer for NoopEnhancer {
    async fn enhance(
        &self,
        image: &DynamicImage,
        _face: &DetectedFace,
    ) -> Result<DynamicImage, VisionError> {
        self.0.enhancements.fetch_add(1, Ordering::SeqCst);
        Ok(image.clone())
    }
}

pub struct FakeModelLoader {
    pub calls: Arc<ModelCalls>,
}

impl FakeModelLoader {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(ModelCalls::default()),
        }
    }
}

#[async_trait]
impl ModelLoader for FakeModelLoader {
    async fn load(&self) -> Result<ModelSet, VisionError> {
        self.calls.loads.fetch_add(1, Ordering::SeqCst);
        Ok(ModelSet {
            detector: Box::new(ColorDetector(self.calls.clone())),
            swapper: Box::new(PaintSwapper(self.calls.clone())),
            enhancer: Box::new(NoopEnhancer(self.calls.clone())),
        })
    }
}

// ---------------------------------------------------------------------------
// Harness

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<RecordingLedger>,
    pub tool: Arc<ScriptedTool>,
    pub models: Arc<FakeModelLoader>,
    pub work_root: tempfile::TempDir,
    pub config: ProcessingConfig,
}

impl Harness {
    pub fn new(tool: ScriptedTool) -> Self {
        let work_root = tempfile::tempdir().unwrap();
        let config = ProcessingConfig {
            work_root: work_root.path().to_path_buf(),
            ..ProcessingConfig::default()
        };
        Self {
            store: Arc::new(MemoryStore::default()),
            ledger: Arc::new(RecordingLedger::default()),
            tool: Arc::new(tool),
            models: Arc::new(FakeModelLoader::new()),
            work_root,
            config,
        }
    }

    pub fn orchestrator(&self) -> VariantOrchestrator {
        VariantOrchestrator::new(
            self.store.clone(),
            self.ledger.clone(),
            self.tool.clone(),
            self.models.clone(),
            self.config.clone(),
        )
    }

    /// Entries left under the work root after a run.
    pub fn leftover_workdirs(&self) -> usize {
        std::fs::read_dir(self.work_root.path()).unwrap().count()
    }

    pub fn archive_entries(&self, user_id: &str, job_id: Uuid) -> Vec<(String, Vec<u8>)> {
        let path = format!("{user_id}/{job_id}/variants.zip");
        let data = self
            .store
            .get(&self.config.output_bucket, &path)
            .expect("archive was not uploaded");
        let mut archive = zip::ZipArchive::new(Cursor::new(data)).unwrap();
        let mut entries = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            let mut bytes = Vec::new();
            std::io::Read::read_to_end(&mut file, &mut bytes).unwrap();
            entries.push((file.name().to_string(), bytes));
        }
        entries.sort();
        entries
    }
}

/// Progress values written to the ledger never decrease.
pub fn assert_monotonic(updates: &[JobUpdate]) {
    for pair in updates.windows(2) {
        assert!(
            pair[1].progress >= pair[0].progress,
            "progress went backwards: {} -> {}",
            pair[0].progress,
            pair[1].progress
        );
        assert!(pair[1].variants_completed >= pair[0].variants_completed);
    }
}

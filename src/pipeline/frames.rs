//! Face-swap over a video, frame by frame.
//!
//! The pipeline moves through `Extracting -> Swapping -> Reassembling -> Done`
//! and refuses calls made out of order. Frames are numbered densely from 1 and
//! every input index produces exactly one output index.

use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::pipeline::command;
use crate::pipeline::error::PipelineError;
use crate::pipeline::ffmpeg::MediaTool;
use crate::services::models::{largest_face, DetectedFace, ModelSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FramePhase {
    Extracting,
    Swapping,
    Reassembling,
    Done,
}

/// File name of frame `index` under [`command::FRAME_PATTERN`].
pub fn frame_name(index: u32) -> String {
    format!("frame_{index:06}.png")
}

/// Find the reference identity. Zero faces is fatal; several faces picks the
/// largest.
pub async fn reference_face(
    models: &ModelSet,
    reference: &DynamicImage,
) -> Result<DetectedFace, PipelineError> {
    let faces = models.detector.detect(reference).await?;
    if faces.len() > 1 {
        tracing::warn!(faces = faces.len(), "Reference image has several faces, using the largest");
    }
    largest_face(&faces)
        .cloned()
        .ok_or(PipelineError::NoReferenceFace)
}

/// Swap the largest face in `image` onto `reference` and enhance it.
/// Returns `None` when the image has no face.
pub async fn swap_largest(
    models: &ModelSet,
    image: &DynamicImage,
    reference: &DetectedFace,
) -> Result<Option<DynamicImage>, PipelineError> {
    let faces = models.detector.detect(image).await?;
    let Some(target) = largest_face(&faces) else {
        return Ok(None);
    };
    let swapped = models.swapper.swap(image, target, reference).await?;
    let enhanced = models.enhancer.enhance(&swapped, target).await?;
    Ok(Some(enhanced))
}

/// Counts gathered while the pipeline runs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub frame_count: u32,
    pub frames_swapped: u32,
    pub faceless_frames: u32,
    pub fps: f64,
    pub has_audio: bool,
}

pub struct FramePipeline<'a> {
    tool: &'a dyn MediaTool,
    models: &'a ModelSet,
    reference: DetectedFace,
    fallback_fps: f64,
    frames_dir: PathBuf,
    swapped_dir: PathBuf,
    phase: FramePhase,
    stats: FrameStats,
}

impl<'a> FramePipeline<'a> {
    /// `reference` must come from [`reference_face`], so the identity is
    /// validated before any frame is touched.
    pub fn new(
        tool: &'a dyn MediaTool,
        models: &'a ModelSet,
        reference: DetectedFace,
        work_dir: &Path,
        fallback_fps: f64,
    ) -> Self {
        Self {
            tool,
            models,
            reference,
            fallback_fps,
            frames_dir: work_dir.join("frames"),
            swapped_dir: work_dir.join("swapped"),
            phase: FramePhase::Extracting,
            stats: FrameStats::default(),
        }
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Decompose `input` into numbered PNG frames. Returns the frame count.
    pub async fn extract(&mut self, input: &Path) -> Result<u32, PipelineError> {
        self.expect_phase(FramePhase::Extracting, FramePhase::Swapping)?;

        tokio::fs::create_dir_all(&self.frames_dir).await?;
        tokio::fs::create_dir_all(&self.swapped_dir).await?;

        let probe = self.tool.probe(input).await?;
        self.stats.fps = match probe.frame_rate() {
            Some(fps) => fps,
            None => {
                tracing::warn!(fallback = self.fallback_fps, "Could not read source frame rate");
                self.fallback_fps
            }
        };
        self.stats.has_audio = probe.has_audio();
        if !self.stats.has_audio {
            tracing::info!("Source has no audio track, swapped video will be silent");
        }

        self.tool
            .run(&command::extract_frames_args(input, &self.frames_dir))
            .await?;

        let count = count_frames(&self.frames_dir).await?;
        if count == 0 {
            return Err(PipelineError::NoFramesExtracted);
        }

        self.stats.frame_count = count;
        self.phase = FramePhase::Swapping;
        tracing::info!(frames = count, fps = self.stats.fps, "Frames extracted");
        Ok(count)
    }

    /// Swap frame `index`. Indices must arrive in order starting at 1.
    pub async fn swap_frame(&mut self, index: u32) -> Result<(), PipelineError> {
        self.expect_phase(FramePhase::Swapping, FramePhase::Swapping)?;
        let expected = self.stats.frames_swapped + 1;
        if index != expected || index > self.stats.frame_count {
            return Err(PipelineError::InvalidTransition {
                from: format!("frame {}", self.stats.frames_swapped),
                to: format!("frame {index}"),
            });
        }

        let name = frame_name(index);
        let source = self.frames_dir.join(&name);
        let target = self.swapped_dir.join(&name);

        let bytes = tokio::fs::read(&source).await?;
        let frame = image::load_from_memory(&bytes)?;

        match swap_largest(self.models, &frame, &self.reference).await? {
            Some(swapped) => swapped.save(&target)?,
            None => {
                tracing::debug!(frame = index, "No face in frame, passing through");
                tokio::fs::copy(&source, &target).await?;
                self.stats.faceless_frames += 1;
            }
        }

        self.stats.frames_swapped = index;
        metrics::counter!("faceswap_frames_total").increment(1);
        Ok(())
    }

    /// Re-encode the swapped frames at the source rate with the source audio.
    pub async fn reassemble(&mut self, audio_source: &Path, output: &Path) -> Result<(), PipelineError> {
        self.expect_phase(FramePhase::Swapping, FramePhase::Reassembling)?;
        if self.stats.frames_swapped != self.stats.frame_count {
            return Err(PipelineError::InvalidTransition {
                from: format!(
                    "swapping at frame {}/{}",
                    self.stats.frames_swapped, self.stats.frame_count
                ),
                to: FramePhase::Reassembling.to_string(),
            });
        }
        self.phase = FramePhase::Reassembling;

        let written = count_frames(&self.swapped_dir).await?;
        if written != self.stats.frame_count {
            return Err(PipelineError::Input(format!(
                "{} frames extracted but {written} swapped frames on disk",
                self.stats.frame_count
            )));
        }

        self.tool
            .run(&command::reassemble_args(
                &self.swapped_dir,
                audio_source,
                self.stats.fps,
                output,
            ))
            .await?;

        self.phase = FramePhase::Done;
        tracing::info!(
            frames = self.stats.frame_count,
            faceless = self.stats.faceless_frames,
            "Swapped video reassembled"
        );
        Ok(())
    }

    fn expect_phase(&self, current: FramePhase, next: FramePhase) -> Result<(), PipelineError> {
        if self.phase != current {
            return Err(PipelineError::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        Ok(())
    }
}

/// Count frames written under [`command::FRAME_PATTERN`], checking the numbering is dense.
async fn count_frames(dir: &Path) -> Result<u32, PipelineError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut indices = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let index = name
            .to_str()
            .and_then(|n| n.strip_prefix("frame_"))
            .and_then(|n| n.strip_suffix(".png"))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(index) = index {
            indices.push(index);
        }
    }

    indices.sort_unstable();
    let dense = indices.iter().zip(1u32..).all(|(&index, expected)| index == expected);
    if !dense {
        return Err(PipelineError::Input(format!(
            "frame numbering in {} has gaps",
            dir.display()
        )));
    }
    Ok(indices.len() as u32)
}

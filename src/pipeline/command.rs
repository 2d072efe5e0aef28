//! Deterministic ffmpeg invocation plans.
//!
//! Nothing here draws random numbers: identical inputs always produce
//! identical argument lists.

use std::path::Path;

use crate::models::variant::TransformParams;
use crate::pipeline::error::PipelineError;

/// Printf-style pattern for extracted and swapped frames.
pub const FRAME_PATTERN: &str = "frame_%06d.png";

/// Per-job switches that shape the filter chain.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterOptions {
    pub remove_watermark: bool,
    pub noise_strength: u32,
    /// Source width and height, when probed.
    pub source_size: Option<(u32, u32)>,
}

/// Video and audio filter descriptions for one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChain {
    pub video: String,
    pub audio: String,
}

/// Build the filter chain for one variant.
pub fn build_filter_chain(
    params: &TransformParams,
    options: &FilterOptions,
) -> Result<FilterChain, PipelineError> {
    let crop = params.crop_px;

    if let Some((width, height)) = options.source_size {
        if 2 * crop >= width || 2 * crop >= height {
            return Err(PipelineError::Input(format!(
                "source {width}x{height} is too small for a {crop}px edge crop"
            )));
        }
    }

    let mut video = Vec::with_capacity(6);

    if options.remove_watermark {
        let (width, height) = options.source_size.ok_or_else(|| {
            PipelineError::Input("watermark removal needs the source dimensions".to_string())
        })?;
        video.push(delogo_filter(width, height));
    }

    video.push(format!(
        "eq=brightness={:.4}:saturation={:.4}",
        params.brightness, params.saturation
    ));
    video.push(format!("hue=h={:.2}", params.hue));
    video.push(format!("crop=iw-{}:ih-{}:{crop}:{crop}", crop * 2, crop * 2));

    if options.noise_strength > 0 {
        video.push(format!(
            "noise=c0s={}:c0f=t:seed={}",
            options.noise_strength, params.noise_seed
        ));
    }

    // Keep picture duration in step with the audio tempo change.
    video.push(format!("setpts=PTS/{:.4}", params.speed));

    Ok(FilterChain {
        video: video.join(","),
        audio: format!("atempo={:.4}", params.speed),
    })
}

/// Blank out the bottom-right corner band where platform watermarks sit.
fn delogo_filter(width: u32, height: u32) -> String {
    let x = (width * 8 / 10).max(1);
    let y = (height * 9 / 10).max(1);
    let w = (width * 18 / 100).max(1);
    let h = (height * 8 / 100).max(1);
    format!("delogo=x={x}:y={y}:w={w}:h={h}:show=0")
}

/// Arguments that drop container and stream metadata.
pub fn metadata_strip_args() -> Vec<String> {
    to_args(&[
        "-map_metadata",
        "-1",
        "-fflags",
        "+bitexact",
        "-flags:v",
        "+bitexact",
        "-flags:a",
        "+bitexact",
    ])
}

fn h264_args() -> Vec<String> {
    to_args(&["-c:v", "libx264", "-preset", "fast", "-crf", "23", "-pix_fmt", "yuv420p"])
}

fn aac_args() -> Vec<String> {
    to_args(&["-c:a", "aac", "-b:a", "128k"])
}

/// Full ffmpeg argument list for one video variant.
pub fn variant_args(input: &Path, output: &Path, chain: &FilterChain) -> Vec<String> {
    let mut args = to_args(&["-y", "-i"]);
    args.push(path_arg(input));
    args.extend(to_args(&["-vf", &chain.video, "-af", &chain.audio]));
    args.extend(metadata_strip_args());
    args.extend(h264_args());
    args.extend(aac_args());
    args.push(path_arg(output));
    args
}

/// Decompose a video into lossless numbered frames at its native rate.
pub fn extract_frames_args(input: &Path, frames_dir: &Path) -> Vec<String> {
    let mut args = to_args(&["-y", "-i"]);
    args.push(path_arg(input));
    args.extend(to_args(&["-map", "0:v:0", "-fps_mode", "passthrough", "-start_number", "1"]));
    args.push(path_arg(&frames_dir.join(FRAME_PATTERN)));
    args
}

/// Re-encode a frame sequence at `fps` and mux the source's audio if it has any.
pub fn reassemble_args(frames_dir: &Path, audio_source: &Path, fps: f64, output: &Path) -> Vec<String> {
    let mut args = to_args(&["-y", "-framerate"]);
    args.push(format_fps(fps));
    args.extend(to_args(&["-start_number", "1", "-i"]));
    args.push(path_arg(&frames_dir.join(FRAME_PATTERN)));
    args.push("-i".to_string());
    args.push(path_arg(audio_source));
    // Trailing `?` makes the audio mapping optional.
    args.extend(to_args(&["-map", "0:v:0", "-map", "1:a:0?"]));
    args.extend(metadata_strip_args());
    args.extend(h264_args());
    args.extend(aac_args());
    args.push(path_arg(output));
    args
}

fn format_fps(fps: f64) -> String {
    let text = format!("{fps:.6}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn to_args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

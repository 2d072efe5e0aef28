//! Job descriptions used across the orchestrator tests.

#![allow(dead_code)]

use content_variants::models::job::{JobKind, JobSpec, SourceType};
use content_variants::models::variant::{CaptionPosition, FontSize, Interval, VideoSettings};
use uuid::Uuid;

pub const USER: &str = "creator-7";
pub const SOURCE_VIDEO: &str = "creator-7/uploads/clip.mp4";
pub const SOURCE_PHOTO: &str = "creator-7/uploads/portrait.png";
pub const FACE_PATH: &str = "creator-7/faces/reference.png";

pub fn video_job(variant_count: u32) -> JobSpec {
    JobSpec {
        job_id: Uuid::new_v4(),
        user_id: USER.to_string(),
        source_path: SOURCE_VIDEO.to_string(),
        variant_count,
        kind: JobKind::Video {
            settings: VideoSettings {
                brightness_range: Interval::new(-0.03, 0.03),
                ..VideoSettings::default()
            },
        },
    }
}

/// Every interval collapsed to a single value, so all variants match.
pub fn degenerate_video_job(variant_count: u32) -> JobSpec {
    let settings = VideoSettings {
        brightness_range: Interval::new(0.01, 0.01),
        saturation_range: Interval::new(1.0, 1.0),
        hue_range: Interval::new(0.0, 0.0),
        crop_px_range: Interval::new(2, 2),
        speed_range: Interval::new(1.0, 1.0),
        ..VideoSettings::default()
    };
    JobSpec {
        kind: JobKind::Video { settings },
        ..video_job(variant_count)
    }
}

pub fn faceswap_job(source_type: SourceType, swap_only: bool, variant_count: u32) -> JobSpec {
    let source_path = match source_type {
        SourceType::Video => SOURCE_VIDEO,
        SourceType::Image => SOURCE_PHOTO,
    };
    JobSpec {
        job_id: Uuid::new_v4(),
        user_id: USER.to_string(),
        source_path: source_path.to_string(),
        variant_count,
        kind: JobKind::Faceswap {
            face_path: FACE_PATH.to_string(),
            source_type,
            swap_only,
        },
    }
}

pub fn caption_job(captions: &[&str]) -> JobSpec {
    JobSpec {
        job_id: Uuid::new_v4(),
        user_id: USER.to_string(),
        source_path: SOURCE_PHOTO.to_string(),
        variant_count: 0,
        kind: JobKind::PhotoCaptions {
            captions: captions.iter().map(|c| c.to_string()).collect(),
            font_size: FontSize::Large,
            position: CaptionPosition::Bottom,
        },
    }
}

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// A closed interval `[min, max]`, serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[T; 2]", into = "[T; 2]")]
pub struct Interval<T: Copy> {
    pub min: T,
    pub max: T,
}

impl<T: Copy> Interval<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: Copy> From<[T; 2]> for Interval<T> {
    fn from([min, max]: [T; 2]) -> Self {
        Self { min, max }
    }
}

impl<T: Copy> From<Interval<T>> for [T; 2] {
    fn from(interval: Interval<T>) -> Self {
        [interval.min, interval.max]
    }
}

impl<T: Copy + PartialOrd> Interval<T> {
    pub fn contains(&self, value: T) -> bool {
        self.min <= value && value <= self.max
    }
}

/// Transform ranges and switches for video jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub brightness_range: Interval<f64>,
    pub saturation_range: Interval<f64>,
    pub hue_range: Interval<f64>,
    pub crop_px_range: Interval<u32>,
    pub speed_range: Interval<f64>,
    pub remove_watermark: bool,
    /// Temporal noise strength; 0 disables the noise filter.
    pub noise_strength: u32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            brightness_range: Interval::new(-0.03, 0.03),
            saturation_range: Interval::new(0.97, 1.03),
            hue_range: Interval::new(-5.0, 5.0),
            crop_px_range: Interval::new(1, 3),
            speed_range: Interval::new(0.98, 1.02),
            remove_watermark: false,
            noise_strength: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FontSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl FontSize {
    pub fn pixels(self) -> f32 {
        match self {
            FontSize::Small => 60.0,
            FontSize::Medium => 80.0,
            FontSize::Large => 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CaptionPosition {
    Top,
    #[default]
    Center,
    Bottom,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptionStyle {
    pub font_size: FontSize,
    pub position: CaptionPosition,
}

/// One variant's sampled transform values. Never mutated after sampling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TransformParams {
    pub brightness: f64,
    pub saturation: f64,
    pub hue: f64,
    pub crop_px: u32,
    pub speed: f64,
    pub noise_seed: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub caption_style: Option<CaptionStyle>,
}

/// A produced artifact, hashed from its final bytes.
#[derive(Debug, Clone)]
pub struct VariantArtifact {
    pub index: u32,
    pub name: String,
    pub bytes: Vec<u8>,
    pub content_hash: String,
    pub content_type: &'static str,
    pub metadata: serde_json::Value,
}

impl VariantArtifact {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Zero-padded artifact name, e.g. `variant_007.mp4`.
pub fn variant_name(prefix: &str, index: u32, extension: &str) -> String {
    format!("{prefix}_{index:03}.{extension}")
}

/// Ledger row for one persisted variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewVariant {
    pub job_id: Uuid,
    pub file_path: String,
    pub file_size: i64,
    pub file_hash: String,
    pub transformations: serde_json::Value,
}

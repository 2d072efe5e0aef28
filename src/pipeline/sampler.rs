//! Bounded-random transform parameters, one draw per variant.

use rand::Rng;

use crate::models::variant::{CaptionStyle, Interval, TransformParams, VideoSettings};
use crate::pipeline::error::PipelineError;

/// Operating range of ffmpeg's `atempo` filter.
pub const ATEMPO_RANGE: Interval<f64> = Interval::new(0.5, 2.0);

/// Range the noise seed is drawn from.
pub const NOISE_SEED_RANGE: Interval<u32> = Interval::new(0, 999_999);

/// Values the `eq` filter accepts for brightness.
pub const BRIGHTNESS_DOMAIN: Interval<f64> = Interval::new(-1.0, 1.0);

/// Values the `eq` filter accepts for saturation.
pub const SATURATION_DOMAIN: Interval<f64> = Interval::new(0.0, 3.0);

/// Hue shift in degrees; one turn either way.
pub const HUE_DOMAIN: Interval<f64> = Interval::new(-180.0, 180.0);

/// Largest per-edge crop.
pub const CROP_PX_MAX: u32 = 100;

/// Validated sampling intervals.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    brightness: Interval<f64>,
    saturation: Interval<f64>,
    hue: Interval<f64>,
    crop_px: Interval<u32>,
    speed: Interval<f64>,
    noise_seed: Interval<u32>,
}

impl SamplerConfig {
    pub fn new(
        brightness: Interval<f64>,
        saturation: Interval<f64>,
        hue: Interval<f64>,
        crop_px: Interval<u32>,
        speed: Interval<f64>,
    ) -> Result<Self, PipelineError> {
        check_float("brightness", brightness, BRIGHTNESS_DOMAIN)?;
        check_float("saturation", saturation, SATURATION_DOMAIN)?;
        check_float("hue", hue, HUE_DOMAIN)?;
        check_float("speed", speed, ATEMPO_RANGE)?;
        check_ordered("crop_px", crop_px)?;
        check_within("crop_px", crop_px, Interval::new(0, CROP_PX_MAX))?;

        Ok(Self {
            brightness,
            saturation,
            hue,
            crop_px,
            speed,
            noise_seed: NOISE_SEED_RANGE,
        })
    }

    pub fn from_settings(settings: &VideoSettings) -> Result<Self, PipelineError> {
        Self::new(
            settings.brightness_range,
            settings.saturation_range,
            settings.hue_range,
            settings.crop_px_range,
            settings.speed_range,
        )
    }

    /// Light ranges for photo variants: ±5% brightness and saturation, small
    /// hue drift. Crop and speed do not apply to stills.
    pub fn photo() -> Self {
        Self {
            brightness: Interval::new(-0.05, 0.05),
            saturation: Interval::new(0.95, 1.05),
            hue: Interval::new(-3.0, 3.0),
            crop_px: Interval::new(0, 0),
            speed: Interval::new(1.0, 1.0),
            noise_seed: NOISE_SEED_RANGE,
        }
    }

    pub fn brightness(&self) -> Interval<f64> {
        self.brightness
    }

    pub fn saturation(&self) -> Interval<f64> {
        self.saturation
    }

    pub fn hue(&self) -> Interval<f64> {
        self.hue
    }

    pub fn crop_px(&self) -> Interval<u32> {
        self.crop_px
    }

    pub fn speed(&self) -> Interval<f64> {
        self.speed
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        let d = VideoSettings::default();
        Self {
            brightness: d.brightness_range,
            saturation: d.saturation_range,
            hue: d.hue_range,
            crop_px: d.crop_px_range,
            speed: d.speed_range,
            noise_seed: NOISE_SEED_RANGE,
        }
    }
}

fn check_ordered<T: Copy + PartialOrd + std::fmt::Display>(
    field: &'static str,
    interval: Interval<T>,
) -> Result<(), PipelineError> {
    if interval.min > interval.max {
        return Err(PipelineError::InvalidInterval {
            field,
            min: interval.min.to_string(),
            max: interval.max.to_string(),
        });
    }
    Ok(())
}

fn check_within<T: Copy + PartialOrd + std::fmt::Display>(
    field: &'static str,
    interval: Interval<T>,
    domain: Interval<T>,
) -> Result<(), PipelineError> {
    if !(domain.contains(interval.min) && domain.contains(interval.max)) {
        return Err(PipelineError::Config(format!(
            "{field} interval [{}, {}] must stay within [{}, {}]",
            interval.min, interval.max, domain.min, domain.max
        )));
    }
    Ok(())
}

/// Finite, ordered, with a finite span, inside `domain`. The sampler draws
/// from the span, so an overflowing one is as bad as an infinite bound.
fn check_float(
    field: &'static str,
    interval: Interval<f64>,
    domain: Interval<f64>,
) -> Result<(), PipelineError> {
    if !interval.min.is_finite() || !interval.max.is_finite() {
        return Err(PipelineError::Config(format!("{field} interval must be finite")));
    }
    check_ordered(field, interval)?;
    if !(interval.max - interval.min).is_finite() {
        return Err(PipelineError::Config(format!("{field} interval is too wide")));
    }
    check_within(field, interval, domain)
}

/// Draws one [`TransformParams`] per call. Draws are independent.
#[derive(Debug, Clone)]
pub struct TransformSampler {
    config: SamplerConfig,
}

impl TransformSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> TransformParams {
        let c = &self.config;
        TransformParams {
            brightness: draw_f64(rng, c.brightness),
            saturation: draw_f64(rng, c.saturation),
            hue: draw_f64(rng, c.hue),
            crop_px: rng.random_range(c.crop_px.min..=c.crop_px.max),
            speed: draw_f64(rng, c.speed),
            noise_seed: rng.random_range(c.noise_seed.min..=c.noise_seed.max),
            caption_style: None,
        }
    }

    pub fn sample_with_caption<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        style: CaptionStyle,
    ) -> TransformParams {
        TransformParams {
            caption_style: Some(style),
            ..self.sample(rng)
        }
    }

    /// Exactly `count` draws from the thread-local generator.
    pub fn sample_many(&self, count: u32) -> Vec<TransformParams> {
        let mut rng = rand::rng();
        (0..count).map(|_| self.sample(&mut rng)).collect()
    }
}

fn draw_f64<R: Rng + ?Sized>(rng: &mut R, interval: Interval<f64>) -> f64 {
    if interval.min == interval.max {
        return interval.min;
    }
    rng.random_range(interval.min..=interval.max)
}

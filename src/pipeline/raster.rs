//! Still-image operations for photo and image face-swap jobs.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageError, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::variant::TransformParams;

/// Quality used when a still is re-encoded without augmentation.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Per-variant finishing touches derived from the noise seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoFinish {
    /// Channel offsets, each in ±1..=3.
    pub tint: [i16; 3],
    pub jpeg_quality: u8,
}

impl PhotoFinish {
    pub fn from_seed(seed: u32) -> Self {
        let mut rng = StdRng::seed_from_u64(u64::from(seed));
        let mut tint = [0i16; 3];
        for offset in tint.iter_mut() {
            let magnitude = rng.random_range(1..=3);
            *offset = if rng.random_bool(0.5) { magnitude } else { -magnitude };
        }
        Self {
            tint,
            jpeg_quality: rng.random_range(85..=95),
        }
    }
}

/// Scale to cover `width`x`height`, then center-crop the overflow.
///
/// A source wider than the target aspect is scaled to the target height;
/// otherwise it is scaled to the target width. No letterboxing.
pub fn fill_and_crop(image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    image.resize_to_fill(width, height, FilterType::Lanczos3)
}

/// Apply brightness, saturation, hue and tint to a copy of `image`.
pub fn augment(image: &DynamicImage, params: &TransformParams, finish: &PhotoFinish) -> RgbImage {
    let degrees = params.hue.round() as i32;
    let mut out = if degrees == 0 {
        image.to_rgb8()
    } else {
        imageops::huerotate(&image.to_rgb8(), degrees)
    };
    let brightness = (1.0 + params.brightness) as f32;
    let saturation = params.saturation as f32;

    for pixel in out.pixels_mut() {
        let [r, g, b] = pixel.0.map(f32::from);
        let gray = 0.299 * r + 0.587 * g + 0.114 * b;
        let channels = [r, g, b];
        let mut adjusted = [0u8; 3];
        for (i, value) in channels.iter().enumerate() {
            let saturated = gray + (value - gray) * saturation;
            let lit = saturated * brightness + f32::from(finish.tint[i]);
            adjusted[i] = lit.round().clamp(0.0, 255.0) as u8;
        }
        *pixel = Rgb(adjusted);
    }
    out
}

/// Encode raw pixels as a baseline JPEG. Nothing from the source container
/// (EXIF, ICC, XMP) can survive because only the pixel buffer is written.
pub fn encode_clean_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), quality);
    image.write_with_encoder(encoder)?;
    Ok(buf)
}

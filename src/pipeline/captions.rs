//! Caption text rendering for photo jobs.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};

use crate::models::variant::{CaptionPosition, CaptionStyle};
use crate::pipeline::error::PipelineError;

const FILL: Rgb<u8> = Rgb([255, 255, 255]);
const STROKE: Rgb<u8> = Rgb([0, 0, 0]);
const STROKE_PX: i32 = 3;
/// Share of the image width a caption line may occupy.
const MAX_LINE_WIDTH: f32 = 0.9;
/// Gap between lines as a share of the font size.
const LINE_SPACING: f32 = 0.2;

/// Greedy word wrap. A single word wider than `max_width` keeps its own line.
pub fn wrap_text(text: &str, max_width: u32, measure: impl Fn(&str) -> u32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{current} {word}");
        if measure(&candidate) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Top edge of a caption block of `block_height` on an image `image_height` tall.
pub fn block_top(position: CaptionPosition, image_height: u32, block_height: u32) -> i32 {
    let h = image_height as f32;
    let block = block_height as f32;
    let top = match position {
        CaptionPosition::Top => h * 0.1,
        CaptionPosition::Bottom => h * 0.9 - block,
        CaptionPosition::Center => (h - block) / 2.0,
    };
    top.round() as i32
}

/// Total height of `lines` lines at `font_px`, spacing included.
pub fn block_height(lines: usize, font_px: f32) -> u32 {
    if lines == 0 {
        return 0;
    }
    let n = lines as f32;
    (n * font_px + (n - 1.0) * font_px * LINE_SPACING).round() as u32
}

pub struct CaptionRenderer {
    font: FontVec,
}

impl CaptionRenderer {
    pub fn load(font_path: &Path) -> Result<Self, PipelineError> {
        let data = std::fs::read(font_path).map_err(|e| {
            PipelineError::Config(format!("caption font {}: {e}", font_path.display()))
        })?;
        let font = FontVec::try_from_vec(data).map_err(|e| {
            PipelineError::Config(format!("caption font {}: {e}", font_path.display()))
        })?;
        Ok(Self { font })
    }

    /// Draw `text` uppercased, wrapped and centered, white with a black stroke.
    pub fn render(&self, image: &mut RgbImage, text: &str, style: CaptionStyle) {
        let font_px = style.font_size.pixels();
        let scale = PxScale::from(font_px);
        let max_width = (image.width() as f32 * MAX_LINE_WIDTH) as u32;
        let upper = text.to_uppercase();

        let lines = wrap_text(&upper, max_width, |line| text_size(scale, &self.font, line).0);
        let top = block_top(style.position, image.height(), block_height(lines.len(), font_px));
        let advance = font_px * (1.0 + LINE_SPACING);

        for (i, line) in lines.iter().enumerate() {
            let (line_width, _) = text_size(scale, &self.font, line);
            let x = (image.width() as i32 - line_width as i32) / 2;
            let y = top + (i as f32 * advance).round() as i32;

            for dx in -STROKE_PX..=STROKE_PX {
                for dy in -STROKE_PX..=STROKE_PX {
                    if (dx, dy) != (0, 0) && dx * dx + dy * dy <= STROKE_PX * STROKE_PX {
                        draw_text_mut(image, STROKE, x + dx, y + dy, scale, &self.font, line);
                    }
                }
            }
            draw_text_mut(image, FILL, x, y, scale, &self.font, line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> u32 {
        s.chars().count() as u32
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let lines = wrap_text("the quick brown fox jumps", 10, chars);
        assert_eq!(lines, vec!["the quick", "brown fox", "jumps"]);
    }

    #[test]
    fn long_words_are_not_split() {
        let lines = wrap_text("a supercalifragilistic word", 8, chars);
        assert_eq!(lines, vec!["a", "supercalifragilistic", "word"]);
    }

    #[test]
    fn blank_text_has_no_lines() {
        assert!(wrap_text("   ", 100, chars).is_empty());
    }

    #[test]
    fn block_positions_follow_the_layout_rules() {
        assert_eq!(block_top(CaptionPosition::Top, 1920, 200), 192);
        assert_eq!(block_top(CaptionPosition::Center, 1920, 200), 860);
        assert_eq!(block_top(CaptionPosition::Bottom, 1920, 200), 1528);
    }

    #[test]
    fn block_height_includes_line_spacing() {
        assert_eq!(block_height(1, 80.0), 80);
        assert_eq!(block_height(3, 100.0), 340);
        assert_eq!(block_height(0, 60.0), 0);
    }

    #[test]
    fn missing_font_is_a_configuration_error() {
        let err = CaptionRenderer::load(Path::new("/nonexistent/font.ttf"))
            .err()
            .unwrap();
        assert_eq!(err.error_code(), "configuration_error");
    }
}

use ab_glyph::{Font, FontVec, PxScale, ScaleFont, point};
use image::{Pixel, Rgba, RgbaImage};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::WatermarkError;

/// Advance-width measurement for a single line of text.
///
/// Layout and drawing must use the same measurer, otherwise text can spill
/// out of the computed block.
pub trait TextMeasurer {
    fn text_width(&self, text: &str, px: f32) -> f32;
}

/// Draws a line of text with its line-box top at `y`.
pub trait TextPainter: TextMeasurer + Send + Sync {
    fn draw_text(&self, canvas: &mut RgbaImage, text: &str, x: f32, y: f32, px: f32, color: Rgba<u8>);
}

/// A parsed font file plus the family name it was registered under.
pub struct FontFace {
    family: String,
    font: FontVec,
}

impl FontFace {
    pub fn from_bytes(family: &str, data: Vec<u8>) -> Result<Self, WatermarkError> {
        let font = FontVec::try_from_vec(data)
            .map_err(|_| WatermarkError::FontError(format!("failed to parse font '{}'", family)))?;
        Ok(Self {
            family: family.to_string(),
            font,
        })
    }

    pub fn load(family: &str, path: &Path) -> Result<Self, WatermarkError> {
        let data = std::fs::read(path)?;
        debug!("Loaded font '{}' from {:?} ({} bytes)", family, path, data.len());
        Self::from_bytes(family, data)
    }

    pub fn family(&self) -> &str {
        &self.family
    }
}

impl TextMeasurer for FontFace {
    fn text_width(&self, text: &str, px: f32) -> f32 {
        let scaled = self.font.as_scaled(PxScale::from(px));
        let mut width = 0.0;
        let mut previous = None;
        for c in text.chars() {
            let id = scaled.glyph_id(c);
            if let Some(prev) = previous {
                width += scaled.kern(prev, id);
            }
            width += scaled.h_advance(id);
            previous = Some(id);
        }
        width
    }
}

impl TextPainter for FontFace {
    fn draw_text(&self, canvas: &mut RgbaImage, text: &str, x: f32, y: f32, px: f32, color: Rgba<u8>) {
        let scale = PxScale::from(px);
        let scaled = self.font.as_scaled(scale);
        let baseline = y + scaled.ascent();
        let (width, height) = canvas.dimensions();

        let mut caret = x;
        let mut previous = None;
        for c in text.chars() {
            let id = scaled.glyph_id(c);
            if let Some(prev) = previous {
                caret += scaled.kern(prev, id);
            }
            previous = Some(id);

            let glyph = id.with_scale_and_position(scale, point(caret, baseline));
            caret += scaled.h_advance(id);

            let Some(outlined) = self.font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let cx = bounds.min.x as i64 + gx as i64;
                let cy = bounds.min.y as i64 + gy as i64;
                if cx < 0 || cy < 0 || cx >= width as i64 || cy >= height as i64 {
                    return;
                }
                let alpha = (coverage.clamp(0.0, 1.0) * color[3] as f32).round() as u8;
                if alpha == 0 {
                    return;
                }
                let target = canvas.get_pixel_mut(cx as u32, cy as u32);
                target.blend(&Rgba([color[0], color[1], color[2], alpha]));
            });
        }
    }
}

/// Registered fonts, looked up by CSS-style family lists such as
/// `"Noto Sans SC", sans-serif`.
#[derive(Default, Clone)]
pub struct FontBook {
    faces: Vec<Arc<FontFace>>,
}

impl FontBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, face: FontFace) {
        self.faces.push(Arc::new(face));
    }

    pub fn load_file(&mut self, family: &str, path: &Path) -> Result<(), WatermarkError> {
        self.register(FontFace::load(family, path)?);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// First registered face matching any family in the list, falling back
    /// to the first registered face.
    pub fn face_for(&self, family_list: &str) -> Option<Arc<FontFace>> {
        let found = family_candidates(family_list).find_map(|candidate| {
            self.faces
                .iter()
                .find(|face| face.family().eq_ignore_ascii_case(candidate))
        });

        match found {
            Some(face) => Some(face.clone()),
            None => {
                let fallback = self.faces.first().cloned();
                if let Some(face) = &fallback {
                    warn!(
                        "No font registered for '{}', falling back to '{}'",
                        family_list,
                        face.family()
                    );
                }
                fallback
            }
        }
    }
}

fn family_candidates(family_list: &str) -> impl Iterator<Item = &str> {
    family_list
        .split(',')
        .map(|name| name.trim().trim_matches(|c: char| c == '"' || c == '\''))
        .filter(|name| !name.is_empty())
}

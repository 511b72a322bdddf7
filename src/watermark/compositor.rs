use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::filter::gaussian_blur_f32;
use tracing::{debug, trace};

use super::formats;
use super::layout::{Rect, ResolvedLayout};
use super::text::TextPainter;
use super::{WatermarkConfig, WatermarkError};

/// Shadow opacity relative to the element drawn above it.
pub const SHADOW_OPACITY: f32 = 0.8;
/// Shadow blur in canvas units; the Gaussian sigma is half of it.
pub const SHADOW_BLUR: f32 = 3.0;
pub const SHADOW_OFFSET_Y: i64 = 1;
/// Room around the block for glyph ink outside the advance box (negative
/// bearings, italic overhang, accents above the ascent), in font sizes.
pub const GLYPH_OVERHANG: f32 = 0.5;

/// Draw the watermark over a copy of `source`.
///
/// The logo is drawn only if the layout reserved space for it. Elements are
/// drawn onto a transparent layer covering the block, which also feeds the
/// shadow when one is configured, and the layer is then blended onto the
/// base image.
pub fn compose(
    source: &DynamicImage,
    layout: &ResolvedLayout,
    config: &WatermarkConfig,
    logo: Option<&RgbaImage>,
    painter: &dyn TextPainter,
) -> RgbaImage {
    let mut canvas = source.to_rgba8();
    let (canvas_width, canvas_height) = canvas.dimensions();

    let pad = layer_padding(layout.font_size, config.text_shadow);
    let Some(bounds) = layer_bounds(&layout.block, pad, canvas_width, canvas_height) else {
        trace!("Watermark block lies outside the canvas, nothing to draw");
        return canvas;
    };
    let (origin_x, origin_y, layer_width, layer_height) = bounds;
    let mut layer = RgbaImage::new(layer_width, layer_height);

    if let (Some(rect), Some(logo)) = (layout.logo, logo) {
        draw_logo(&mut layer, logo, &rect, origin_x, origin_y);
    }

    let color = config.font_color.rgba();
    for line in &layout.lines {
        painter.draw_text(
            &mut layer,
            &line.text,
            line.x - origin_x as f32,
            line.y - origin_y as f32,
            layout.font_size,
            color,
        );
    }

    if config.text_shadow {
        let shadow = shadow_of(&layer);
        imageops::overlay(&mut canvas, &shadow, origin_x, origin_y + SHADOW_OFFSET_Y);
    }
    imageops::overlay(&mut canvas, &layer, origin_x, origin_y);

    canvas
}

/// Compose and encode with the configured codec and quality.
pub fn render(
    source: &DynamicImage,
    layout: &ResolvedLayout,
    config: &WatermarkConfig,
    logo: Option<&RgbaImage>,
    painter: &dyn TextPainter,
    icc_profile: Option<&[u8]>,
) -> Result<Vec<u8>, WatermarkError> {
    let composed = compose(source, layout, config, logo, painter);
    let encoded = formats::encode(
        &composed,
        config.export_format,
        config.export_quality,
        icc_profile,
    )?;
    debug!(
        "Encoded {}x{} {} ({} bytes)",
        composed.width(),
        composed.height(),
        config.export_format,
        encoded.len()
    );
    Ok(encoded)
}

fn layer_padding(font_size: f32, text_shadow: bool) -> i64 {
    let overhang = (font_size * GLYPH_OVERHANG).ceil().max(0.0) as i64;
    if text_shadow {
        overhang + (SHADOW_BLUR * 1.5).ceil() as i64 + SHADOW_OFFSET_Y
    } else {
        overhang
    }
}

/// Canvas-clipped pixel bounds of the block grown by `pad`:
/// `(x, y, width, height)`, or `None` when nothing is visible.
fn layer_bounds(block: &Rect, pad: i64, width: u32, height: u32) -> Option<(i64, i64, u32, u32)> {
    let left = (block.x.floor() as i64 - pad).max(0);
    let top = (block.y.floor() as i64 - pad).max(0);
    let right = (block.right().ceil() as i64 + pad).min(width as i64);
    let bottom = (block.bottom().ceil() as i64 + pad).min(height as i64);

    if right <= left || bottom <= top {
        return None;
    }
    Some((left, top, (right - left) as u32, (bottom - top) as u32))
}

fn draw_logo(layer: &mut RgbaImage, logo: &RgbaImage, rect: &Rect, origin_x: i64, origin_y: i64) {
    let width = rect.width.round().max(1.0) as u32;
    let height = rect.height.round().max(1.0) as u32;
    let resized = if logo.dimensions() == (width, height) {
        logo.clone()
    } else {
        imageops::resize(logo, width, height, FilterType::Triangle)
    };
    imageops::overlay(
        layer,
        &resized,
        rect.x.round() as i64 - origin_x,
        rect.y.round() as i64 - origin_y,
    );
}

/// Blurred, semi-transparent black silhouette of everything on `layer`.
fn shadow_of(layer: &RgbaImage) -> RgbaImage {
    let silhouette = RgbaImage::from_fn(layer.width(), layer.height(), |x, y| {
        let alpha = layer.get_pixel(x, y)[3] as f32 * SHADOW_OPACITY;
        Rgba([0, 0, 0, alpha.round() as u8])
    });
    gaussian_blur_f32(&silhouette, SHADOW_BLUR / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watermark::layout::{RenderTarget, resolve};
    use crate::watermark::text::testing::{BlockGlyphs, find_test_font};
    use crate::watermark::text::FontFace;
    use crate::watermark::{ExportFormat, FontColor, PositionAnchor};
    use image::GenericImageView;

    const GRAY: Rgba<u8> = Rgba([128, 128, 128, 255]);

    fn source(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, GRAY))
    }

    fn plain_config() -> WatermarkConfig {
        WatermarkConfig {
            text_shadow: false,
            font_color: FontColor(Rgba([255, 0, 0, 255])),
            position: PositionAnchor::TopLeft,
            ..Default::default()
        }
    }

    fn layout_for(
        img: &DynamicImage,
        config: &WatermarkConfig,
        lines: &[&str],
        logo: Option<&RgbaImage>,
    ) -> ResolvedLayout {
        let (w, h) = img.dimensions();
        let lines: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
        resolve(
            RenderTarget::new(w, h),
            config,
            &lines,
            logo.map(|l| l.dimensions()),
            &BlockGlyphs,
        )
    }

    #[test]
    fn test_output_matches_source_size() {
        let img = source(300, 200);
        let config = plain_config();
        let layout = layout_for(&img, &config, &["hello"], None);
        let out = compose(&img, &layout, &config, None, &BlockGlyphs);
        assert_eq!(out.dimensions(), (300, 200));
    }

    #[test]
    fn test_text_drawn_inside_block_only() {
        let img = source(400, 400);
        let config = plain_config();
        let layout = layout_for(&img, &config, &["abc", "abcdef"], None);
        let out = compose(&img, &layout, &config, None, &BlockGlyphs);

        let block = layout.block;
        let mut red_pixels = 0;
        for (x, y, p) in out.enumerate_pixels() {
            if *p == Rgba([255, 0, 0, 255]) {
                red_pixels += 1;
                assert!(x as f32 >= block.x.floor() && (x as f32) < block.right().ceil());
                assert!(y as f32 >= block.y.floor() && (y as f32) < block.bottom().ceil());
            }
        }
        assert!(red_pixels > 0);
        // Far corner is untouched
        assert_eq!(*out.get_pixel(399, 399), GRAY);
    }

    #[test]
    fn test_shadow_darkens_below_text_without_moving_it() {
        let img = source(400, 400);
        let plain = plain_config();
        let shadowed = WatermarkConfig {
            text_shadow: true,
            ..plain.clone()
        };
        let layout = layout_for(&img, &plain, &["abcdef"], None);
        assert_eq!(layout, layout_for(&img, &shadowed, &["abcdef"], None));

        let without = compose(&img, &layout, &plain, None, &BlockGlyphs);
        let with = compose(&img, &layout, &shadowed, None, &BlockGlyphs);

        // Text pixels are identical, some background pixels got darker
        let mut darker = 0;
        for ((_, _, a), (_, _, b)) in without.enumerate_pixels().zip(with.enumerate_pixels()) {
            if *a == Rgba([255, 0, 0, 255]) {
                assert_eq!(a, b);
            } else if b[0] < a[0] {
                darker += 1;
            }
        }
        assert!(darker > 0);
        assert_eq!(*with.get_pixel(399, 399), GRAY);
    }

    #[test]
    fn test_logo_is_drawn_in_its_rect() {
        let img = source(1000, 1000);
        let config = plain_config();
        let logo = RgbaImage::from_pixel(100, 50, Rgba([0, 0, 255, 255]));
        let layout = layout_for(&img, &config, &["a"], Some(&logo));
        let rect = layout.logo.unwrap();

        let out = compose(&img, &layout, &config, Some(&logo), &BlockGlyphs);
        let cx = (rect.x + rect.width / 2.0) as u32;
        let cy = (rect.y + rect.height / 2.0) as u32;
        let center = out.get_pixel(cx, cy);
        assert!(center[2] > 240 && center[0] < 15, "logo pixel was {:?}", center);
        assert_eq!(*out.get_pixel(cx, rect.bottom() as u32 + 3), GRAY);
    }

    #[test]
    fn test_block_off_canvas_is_skipped() {
        let img = source(50, 50);
        let config = WatermarkConfig {
            margin_x: 500.0,
            ..plain_config()
        };
        let layout = layout_for(&img, &config, &["abc"], None);
        let out = compose(&img, &layout, &config, None, &BlockGlyphs);
        assert_eq!(DynamicImage::ImageRgba8(out), img);
    }

    #[test]
    fn test_render_png_round_trip_dimensions() {
        let img = source(120, 80);
        let config = WatermarkConfig {
            export_format: ExportFormat::Png,
            ..plain_config()
        };
        let layout = layout_for(&img, &config, &["x"], None);
        let data = render(&img, &layout, &config, None, &BlockGlyphs, None).unwrap();
        let decoded = image::load_from_memory(&data).unwrap().to_rgba8();
        assert_eq!(decoded, compose(&img, &layout, &config, None, &BlockGlyphs));
    }

    #[test]
    fn test_layer_padding() {
        assert_eq!(layer_padding(24.0, false), 12);
        assert_eq!(layer_padding(48.0, false), 24);
        assert_eq!(layer_padding(24.0, true), 12 + 5 + 1);
        assert_eq!(layer_padding(0.0, false), 0);
    }

    #[test]
    fn test_glyph_overhang_is_not_clipped() {
        // Skip test if no font file is available
        let Some(path) = find_test_font() else {
            return;
        };
        let face = FontFace::load("DejaVu Sans", &path).unwrap();

        let img = source(400, 300);
        let config = WatermarkConfig {
            text_shadow: false,
            font_color: FontColor::WHITE,
            position: PositionAnchor::TopLeft,
            font_size: 48.0,
            ..Default::default()
        };
        let lines = vec!["jÅfÉj".to_string()];
        let layout = resolve(RenderTarget::new(400, 300), &config, &lines, None, &face);

        let composed = compose(&img, &layout, &config, None, &face);

        let mut direct = img.to_rgba8();
        for line in &layout.lines {
            face.draw_text(
                &mut direct,
                &line.text,
                line.x,
                line.y,
                layout.font_size,
                config.font_color.rgba(),
            );
        }

        let inked = |p: &Rgba<u8>| p[0] > GRAY[0] + 8;
        let lost_ink = direct
            .enumerate_pixels()
            .filter(|(x, y, p)| inked(*p) && !inked(composed.get_pixel(*x, *y)))
            .count();
        assert!(direct.pixels().any(inked));
        assert_eq!(lost_ink, 0);
    }

    #[test]
    fn test_layer_bounds_clipping() {
        let block = Rect {
            x: -10.5,
            y: 5.2,
            width: 30.0,
            height: 10.0,
        };
        assert_eq!(layer_bounds(&block, 2, 100, 100), Some((0, 3, 22, 15)));
        assert_eq!(layer_bounds(&block, 0, 5, 5), None);
    }
}

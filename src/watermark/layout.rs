//! Pure geometry: image size and watermark configuration in, pixel
//! positions of the block, every text line and the logo out.

use serde::Serialize;

use super::WatermarkConfig;
use super::text::TextMeasurer;

/// Short side length the base sizes are specified against.
pub const REFERENCE_SIZE: f32 = 1000.0;
/// Floor for the adaptive ratio so thumbnails stay legible.
pub const MIN_RATIO: f32 = 0.5;
pub const LINE_HEIGHT_FACTOR: f32 = 1.4;
pub const LOGO_BASE_HEIGHT: f32 = 40.0;
/// Space between the logo and the first text line, before scaling.
pub const LOGO_GAP: f32 = 10.0;

/// Pixel size of the image being watermarked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn adaptive_ratio(&self) -> f32 {
        let short_side = self.width.min(self.height) as f32;
        (short_side / REFERENCE_SIZE).max(MIN_RATIO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// A text line positioned inside the block; `y` is the top of its line box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedLine {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLayout {
    pub ratio: f32,
    pub font_size: f32,
    pub line_height: f32,
    pub margin_x: f32,
    pub margin_y: f32,
    pub block: Rect,
    pub lines: Vec<PlacedLine>,
    pub logo: Option<Rect>,
}

/// Lay out the watermark block.
///
/// `logo_size` is the native size of the decoded logo. Pass `None` when no
/// logo is configured or it could not be decoded; the block is then laid out
/// as if there were no logo at all. Empty lines take no space.
pub fn resolve(
    target: RenderTarget,
    config: &WatermarkConfig,
    lines: &[String],
    logo_size: Option<(u32, u32)>,
    measurer: &dyn TextMeasurer,
) -> ResolvedLayout {
    let ratio = target.adaptive_ratio();
    let unit = config.scale * ratio;
    let font_size = config.font_size * unit;
    let line_height = font_size * LINE_HEIGHT_FACTOR;

    let measured: Vec<(&str, f32)> = lines
        .iter()
        .filter(|line| !line.is_empty())
        .map(|line| (line.as_str(), measurer.text_width(line, font_size)))
        .collect();

    let logo_extent = logo_size
        .filter(|&(w, h)| w > 0 && h > 0)
        .map(|(w, h)| {
            let height = LOGO_BASE_HEIGHT * unit;
            (w as f32 / h as f32 * height, height)
        });
    let logo_gap = LOGO_GAP * unit;

    let text_width = measured.iter().map(|(_, w)| *w).fold(0.0, f32::max);
    let block_width = logo_extent.map_or(text_width, |(w, _)| text_width.max(w));
    let block_height = measured.len() as f32 * line_height
        + logo_extent.map_or(0.0, |(_, h)| h + logo_gap);

    let (horizontal, vertical) = config.position.edges();
    let block = Rect {
        x: horizontal.place(target.width as f32, config.margin_x, block_width),
        y: vertical.place(target.height as f32, config.margin_y, block_height),
        width: block_width,
        height: block_height,
    };

    let align = config.text_align;
    let mut cursor = block.y;

    let logo = logo_extent.map(|(width, height)| {
        let rect = Rect {
            x: block.x + align.offset(block.width, width),
            y: cursor,
            width,
            height,
        };
        cursor += height + logo_gap;
        rect
    });

    let lines = measured
        .into_iter()
        .map(|(text, width)| {
            let line = PlacedLine {
                text: text.to_string(),
                x: block.x + align.offset(block.width, width),
                y: cursor,
                width,
            };
            cursor += line_height;
            line
        })
        .collect();

    ResolvedLayout {
        ratio,
        font_size,
        line_height,
        margin_x: config.margin_x,
        margin_y: config.margin_y,
        block,
        lines,
        logo,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watermark::text::testing::BlockGlyphs;
    use crate::watermark::{PositionAnchor, TextAlign};

    const EPSILON: f32 = 1e-3;

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < EPSILON,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    fn lines(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    fn config_at(position: PositionAnchor) -> WatermarkConfig {
        WatermarkConfig {
            position,
            ..Default::default()
        }
    }

    #[test]
    fn test_ratio_at_reference_size() {
        assert_eq!(RenderTarget::new(1000, 1000).adaptive_ratio(), 1.0);
    }

    #[test]
    fn test_ratio_floor_on_small_images() {
        assert_eq!(RenderTarget::new(400, 400).adaptive_ratio(), 0.5);
        assert_eq!(RenderTarget::new(64, 4000).adaptive_ratio(), 0.5);
    }

    #[test]
    fn test_ratio_uses_short_side() {
        assert_eq!(RenderTarget::new(4000, 3000).adaptive_ratio(), 3.0);
        assert_eq!(RenderTarget::new(1200, 800).adaptive_ratio(), 0.8);
    }

    #[test]
    fn test_bottom_left_two_lines() {
        let config = WatermarkConfig {
            position: PositionAnchor::BottomLeft,
            margin_x: 30.0,
            margin_y: 30.0,
            scale: 1.0,
            font_size: 24.0,
            ..Default::default()
        };
        let layout = resolve(
            RenderTarget::new(1200, 1000),
            &config,
            &lines(&["line one", "line two"]),
            None,
            &BlockGlyphs,
        );

        assert_eq!(layout.ratio, 1.0);
        assert_close(layout.font_size, 24.0);
        assert_close(layout.line_height, 33.6);
        assert_close(layout.block.height, 67.2);
        assert_close(layout.block.y, 1000.0 - 30.0 - 67.2);
        assert_eq!(layout.block.x, 30.0);
        assert_eq!(layout.lines.len(), 2);
        assert_close(layout.lines[1].y - layout.lines[0].y, 33.6);
        assert!(layout.logo.is_none());
    }

    #[test]
    fn test_bottom_right_is_exact() {
        let config = WatermarkConfig {
            margin_x: 25.0,
            margin_y: 25.0,
            ..config_at(PositionAnchor::BottomRight)
        };
        let layout = resolve(
            RenderTarget::new(1600, 900),
            &config,
            &lines(&["a", "abcdef"]),
            None,
            &BlockGlyphs,
        );
        let block = layout.block;
        assert_eq!(block.x, 1600.0 - 25.0 - block.width);
        assert_eq!(block.y, 900.0 - 25.0 - block.height);
    }

    #[test]
    fn test_all_anchors() {
        let target = RenderTarget::new(1000, 1000);
        let text = lines(&["0123456789"]);
        for anchor in PositionAnchor::ALL {
            let layout = resolve(target, &config_at(anchor), &text, None, &BlockGlyphs);
            let block = layout.block;
            let name = anchor.as_str();

            let expected_x = if name.contains("left") {
                30.0
            } else if name.contains("right") {
                1000.0 - 30.0 - block.width
            } else {
                (1000.0 - block.width) / 2.0
            };
            let expected_y = if name.starts_with("top") {
                30.0
            } else if name.starts_with("bottom") {
                1000.0 - 30.0 - block.height
            } else {
                (1000.0 - block.height) / 2.0
            };

            assert_eq!(block.x, expected_x, "{}", name);
            assert_eq!(block.y, expected_y, "{}", name);
        }
    }

    #[test]
    fn test_margin_independent_of_scale() {
        let target = RenderTarget::new(2000, 2000);
        let text = lines(&["abc", "defgh"]);
        let small = WatermarkConfig {
            scale: 1.0,
            ..config_at(PositionAnchor::BottomRight)
        };
        let large = WatermarkConfig {
            scale: 2.0,
            ..small.clone()
        };

        let a = resolve(target, &small, &text, None, &BlockGlyphs);
        let b = resolve(target, &large, &text, None, &BlockGlyphs);

        assert_close(2000.0 - a.block.right(), 30.0);
        assert_close(2000.0 - b.block.right(), 30.0);
        assert_close(2000.0 - a.block.bottom(), 30.0);
        assert_close(2000.0 - b.block.bottom(), 30.0);
        assert_eq!(a.margin_x, b.margin_x);
        assert_close(b.font_size, a.font_size * 2.0);
        assert_close(b.line_height, a.line_height * 2.0);
    }

    #[test]
    fn test_empty_lines_take_no_space() {
        let target = RenderTarget::new(1000, 1000);
        let config = config_at(PositionAnchor::TopLeft);
        let with_blanks = resolve(
            target,
            &config,
            &lines(&["", "time", ""]),
            None,
            &BlockGlyphs,
        );
        let without = resolve(target, &config, &lines(&["time"]), None, &BlockGlyphs);
        assert_eq!(with_blanks, without);
        assert_eq!(with_blanks.lines.len(), 1);
    }

    #[test]
    fn test_block_width_is_widest_element() {
        let config = WatermarkConfig {
            text_align: TextAlign::End,
            ..config_at(PositionAnchor::TopLeft)
        };
        let layout = resolve(
            RenderTarget::new(1000, 1000),
            &config,
            &lines(&["ab", "abcdefgh"]),
            None,
            &BlockGlyphs,
        );
        // 8 chars at 12px advance
        assert_close(layout.block.width, 96.0);
        // Right aligned lines share the block's right edge
        for line in &layout.lines {
            assert_close(line.x + line.width, layout.block.right());
        }
        assert_close(layout.lines[0].x, 30.0 + 96.0 - 24.0);
    }

    #[test]
    fn test_center_alignment_inside_block() {
        let config = WatermarkConfig {
            text_align: TextAlign::Center,
            ..config_at(PositionAnchor::Center)
        };
        let layout = resolve(
            RenderTarget::new(1000, 1000),
            &config,
            &lines(&["abcd", "ab"]),
            None,
            &BlockGlyphs,
        );
        let center = layout.block.x + layout.block.width / 2.0;
        for line in &layout.lines {
            assert_close(line.x + line.width / 2.0, center);
        }
    }

    #[test]
    fn test_logo_placement() {
        let config = WatermarkConfig {
            text_align: TextAlign::Center,
            ..config_at(PositionAnchor::TopLeft)
        };
        // 2:1 logo, 40px tall at ratio 1, so 80px wide
        let layout = resolve(
            RenderTarget::new(1000, 1000),
            &config,
            &lines(&["ab"]),
            Some((200, 100)),
            &BlockGlyphs,
        );
        let logo = layout.logo.unwrap();
        assert_close(logo.height, 40.0);
        assert_close(logo.width, 80.0);
        assert_close(layout.block.width, 80.0);
        assert_close(layout.block.height, 40.0 + 10.0 + 33.6);
        assert_eq!(logo.y, layout.block.y);
        assert_eq!(logo.x, layout.block.x);
        assert_close(layout.lines[0].y, layout.block.y + 50.0);
        // 24px wide text centered in an 80px block
        assert_close(layout.lines[0].x, 30.0 + 28.0);
    }

    #[test]
    fn test_logo_scales_with_ratio_and_scale() {
        let config = WatermarkConfig {
            scale: 1.5,
            ..config_at(PositionAnchor::BottomLeft)
        };
        let layout = resolve(
            RenderTarget::new(2000, 3000),
            &config,
            &lines(&["x"]),
            Some((50, 50)),
            &BlockGlyphs,
        );
        let logo = layout.logo.unwrap();
        assert_close(logo.height, 40.0 * 1.5 * 2.0);
        assert_close(logo.width, logo.height);
        assert_close(
            layout.lines[0].y - logo.y,
            logo.height + 10.0 * 1.5 * 2.0,
        );
    }

    #[test]
    fn test_missing_logo_leaves_no_gap() {
        let target = RenderTarget::new(1000, 1000);
        let config = config_at(PositionAnchor::BottomLeft);
        let text = lines(&["one", "two"]);
        let degenerate = resolve(target, &config, &text, Some((0, 0)), &BlockGlyphs);
        let none = resolve(target, &config, &text, None, &BlockGlyphs);
        assert_eq!(degenerate, none);
    }
}

use image::{ImageFormat, Rgba};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::WatermarkError;
use crate::time_format::TimeFormat;

/// Output codec for the composited image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Jpeg,
    Png,
    WebP,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Png => "png",
            ExportFormat::WebP => "webp",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            ExportFormat::Jpeg => ImageFormat::Jpeg,
            ExportFormat::Png => ImageFormat::Png,
            ExportFormat::WebP => ImageFormat::WebP,
        }
    }

    /// Whether the codec honours the quality factor.
    pub fn is_lossy(&self) -> bool {
        !matches!(self, ExportFormat::Png)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Jpeg => "jpeg",
            ExportFormat::Png => "png",
            ExportFormat::WebP => "webp",
        };
        f.write_str(name)
    }
}

impl FromStr for ExportFormat {
    type Err = WatermarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ExportFormat::Jpeg),
            "png" => Ok(ExportFormat::Png),
            "webp" => Ok(ExportFormat::WebP),
            other => Err(WatermarkError::InvalidConfig(format!(
                "unknown export format '{}'",
                other
            ))),
        }
    }
}

/// Placement of the block along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Measured from the left or top edge.
    Start,
    Center,
    /// Measured from the right or bottom edge.
    End,
}

impl Edge {
    /// Leading coordinate of an extent of `extent` pixels on an axis of
    /// `canvas` pixels.
    pub fn place(self, canvas: f32, margin: f32, extent: f32) -> f32 {
        match self {
            Edge::Start => margin,
            Edge::Center => (canvas - extent) / 2.0,
            Edge::End => canvas - margin - extent,
        }
    }
}

/// One of the nine screen-relative anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PositionAnchor {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    #[default]
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl PositionAnchor {
    pub const ALL: [PositionAnchor; 9] = [
        PositionAnchor::TopLeft,
        PositionAnchor::TopCenter,
        PositionAnchor::TopRight,
        PositionAnchor::CenterLeft,
        PositionAnchor::Center,
        PositionAnchor::CenterRight,
        PositionAnchor::BottomLeft,
        PositionAnchor::BottomCenter,
        PositionAnchor::BottomRight,
    ];

    /// Horizontal and vertical edge the block is placed against.
    pub fn edges(self) -> (Edge, Edge) {
        match self {
            PositionAnchor::TopLeft => (Edge::Start, Edge::Start),
            PositionAnchor::TopCenter => (Edge::Center, Edge::Start),
            PositionAnchor::TopRight => (Edge::End, Edge::Start),
            PositionAnchor::CenterLeft => (Edge::Start, Edge::Center),
            PositionAnchor::Center => (Edge::Center, Edge::Center),
            PositionAnchor::CenterRight => (Edge::End, Edge::Center),
            PositionAnchor::BottomLeft => (Edge::Start, Edge::End),
            PositionAnchor::BottomCenter => (Edge::Center, Edge::End),
            PositionAnchor::BottomRight => (Edge::End, Edge::End),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionAnchor::TopLeft => "top-left",
            PositionAnchor::TopCenter => "top-center",
            PositionAnchor::TopRight => "top-right",
            PositionAnchor::CenterLeft => "center-left",
            PositionAnchor::Center => "center",
            PositionAnchor::CenterRight => "center-right",
            PositionAnchor::BottomLeft => "bottom-left",
            PositionAnchor::BottomCenter => "bottom-center",
            PositionAnchor::BottomRight => "bottom-right",
        }
    }
}

impl fmt::Display for PositionAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionAnchor {
    type Err = WatermarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PositionAnchor::ALL
            .into_iter()
            .find(|anchor| anchor.as_str() == s)
            .ok_or_else(|| WatermarkError::InvalidConfig(format!("unknown position '{}'", s)))
    }
}

/// Alignment of each element inside the shared block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    #[serde(alias = "left")]
    Start,
    Center,
    #[serde(alias = "right")]
    End,
}

impl TextAlign {
    /// Offset of an element of `width` pixels from the block's left edge.
    pub fn offset(self, block_width: f32, width: f32) -> f32 {
        match self {
            TextAlign::Start => 0.0,
            TextAlign::Center => (block_width - width) / 2.0,
            TextAlign::End => block_width - width,
        }
    }
}

impl FromStr for TextAlign {
    type Err = WatermarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" | "left" => Ok(TextAlign::Start),
            "center" => Ok(TextAlign::Center),
            "end" | "right" => Ok(TextAlign::End),
            other => Err(WatermarkError::InvalidConfig(format!(
                "unknown alignment '{}'",
                other
            ))),
        }
    }
}

/// Text color, written as `#RGB`, `#RRGGBB` or `#RRGGBBAA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FontColor(pub Rgba<u8>);

impl FontColor {
    pub const WHITE: FontColor = FontColor(Rgba([255, 255, 255, 255]));

    pub fn rgba(&self) -> Rgba<u8> {
        self.0
    }
}

impl Default for FontColor {
    fn default() -> Self {
        FontColor::WHITE
    }
}

impl FromStr for FontColor {
    type Err = WatermarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WatermarkError::InvalidColor(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.is_ascii() {
            return Err(invalid());
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| invalid())
        };
        let short = |i: usize| channel(i..i + 1).map(|v| v * 17);

        let rgba = match hex.len() {
            3 => [short(0)?, short(1)?, short(2)?, 255],
            6 => [channel(0..2)?, channel(2..4)?, channel(4..6)?, 255],
            8 => [
                channel(0..2)?,
                channel(2..4)?,
                channel(4..6)?,
                channel(6..8)?,
            ],
            _ => return Err(invalid()),
        };
        Ok(FontColor(Rgba(rgba)))
    }
}

impl TryFrom<String> for FontColor {
    type Error = WatermarkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FontColor> for String {
    fn from(color: FontColor) -> Self {
        let [r, g, b, a] = color.0.0;
        if a == 255 {
            format!("#{:02X}{:02X}{:02X}", r, g, b)
        } else {
            format!("#{:02X}{:02X}{:02X}{:02X}", r, g, b, a)
        }
    }
}

/// A user-defined `label：value` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomItem {
    pub label: String,
    #[serde(default)]
    pub value: String,
}

/// Prefixes for the built-in lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineLabels {
    pub area: String,
    pub content: String,
    pub time: String,
    pub separator: String,
}

impl Default for LineLabels {
    fn default() -> Self {
        Self {
            area: "施工区域".to_string(),
            content: "施工内容".to_string(),
            time: "拍摄时间".to_string(),
            separator: "：".to_string(),
        }
    }
}

/// Everything needed to lay out and draw one watermark.
///
/// Sizes are in reference-resolution units: font size and logo height are
/// multiplied by `scale` and the adaptive ratio, margins are used as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    pub area: String,
    pub content: String,
    pub use_exif_time: bool,
    pub custom_time: String,
    pub time_format: TimeFormat,
    pub custom_items: Vec<CustomItem>,
    pub logo: Option<PathBuf>,
    pub font_family: String,
    pub font_size: f32,
    pub font_color: FontColor,
    pub text_shadow: bool,
    pub position: PositionAnchor,
    pub text_align: TextAlign,
    pub scale: f32,
    pub margin_x: f32,
    pub margin_y: f32,
    pub export_format: ExportFormat,
    pub export_quality: f32,
    pub labels: LineLabels,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            area: String::new(),
            content: String::new(),
            use_exif_time: true,
            custom_time: String::new(),
            time_format: TimeFormat::default(),
            custom_items: Vec::new(),
            logo: None,
            font_family: "Noto Sans SC".to_string(),
            font_size: 24.0,
            font_color: FontColor::WHITE,
            text_shadow: true,
            position: PositionAnchor::BottomLeft,
            text_align: TextAlign::Start,
            scale: 1.0,
            margin_x: 30.0,
            margin_y: 30.0,
            export_format: ExportFormat::Jpeg,
            export_quality: 0.92,
            labels: LineLabels::default(),
        }
    }
}

impl WatermarkConfig {
    /// Reject out-of-range values. Nothing is clamped.
    pub fn validate(&self) -> Result<(), WatermarkError> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(WatermarkError::InvalidConfig(format!(
                "scale must be positive, got {}",
                self.scale
            )));
        }
        if !self.font_size.is_finite() || self.font_size < 0.0 {
            return Err(WatermarkError::InvalidConfig(format!(
                "font_size must be non-negative, got {}",
                self.font_size
            )));
        }
        for (name, margin) in [("margin_x", self.margin_x), ("margin_y", self.margin_y)] {
            if !margin.is_finite() || margin < 0.0 {
                return Err(WatermarkError::InvalidConfig(format!(
                    "{} must be non-negative, got {}",
                    name, margin
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.export_quality) {
            return Err(WatermarkError::InvalidConfig(format!(
                "export_quality must be within 0.0..=1.0, got {}",
                self.export_quality
            )));
        }
        Ok(())
    }
}

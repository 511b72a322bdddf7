// Watermark engine - line content, layout, compositing and encoding
pub mod compositor;
pub mod content;
mod error;
pub mod formats;
pub mod layout;
pub mod text;
mod types;

pub use compositor::{compose, render};
pub use content::build_lines;
pub use error::WatermarkError;
pub use layout::{PlacedLine, Rect, RenderTarget, ResolvedLayout, resolve};
pub use text::{FontBook, FontFace, TextMeasurer, TextPainter};
pub use types::{
    CustomItem, Edge, ExportFormat, FontColor, LineLabels, PositionAnchor, TextAlign,
    WatermarkConfig,
};

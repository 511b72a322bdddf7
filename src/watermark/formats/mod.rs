//! In-memory encoders for the three export codecs, plus ICC profile
//! extraction from source images so the output keeps its color space.

pub mod jpeg;
pub mod png;
pub mod webp;

use image::{ImageFormat, RgbaImage};

use super::{ExportFormat, WatermarkError};

/// Encode a composited raster. `quality` is 0.0..=1.0 and is ignored for
/// PNG; values outside that range are an encode error.
pub fn encode(
    image: &RgbaImage,
    format: ExportFormat,
    quality: f32,
    icc_profile: Option<&[u8]>,
) -> Result<Vec<u8>, WatermarkError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(WatermarkError::encode(format, "image has no pixels"));
    }
    if format.is_lossy() && !(0.0..=1.0).contains(&quality) {
        return Err(WatermarkError::encode(
            format,
            format!("quality {} outside 0.0..=1.0", quality),
        ));
    }

    match format {
        ExportFormat::Jpeg => jpeg::encode(image, jpeg_quality(quality), icc_profile),
        ExportFormat::Png => png::encode(image),
        ExportFormat::WebP => webp::encode(image, quality * 100.0, icc_profile),
    }
}

fn jpeg_quality(quality: f32) -> u8 {
    ((quality * 100.0).round() as u8).max(1)
}

/// ICC profile embedded in a JPEG or PNG source, if any.
pub fn extract_icc_profile(data: &[u8]) -> Option<Vec<u8>> {
    match image::guess_format(data).ok()? {
        ImageFormat::Jpeg => jpeg::extract_icc_profile(data),
        ImageFormat::Png => png::extract_icc_profile(data),
        _ => None,
    }
}

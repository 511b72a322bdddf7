use image::buffer::ConvertBuffer;
use image::{ExtendedColorType, ImageEncoder, RgbImage, RgbaImage, codecs::jpeg::JpegEncoder};
use tracing::debug;

use crate::watermark::{ExportFormat, WatermarkError};

const ICC_MARKER: &[u8] = b"ICC_PROFILE\0";

/// Extract the ICC profile from a JPEG byte stream.
///
/// Profiles larger than one APP2 segment are split across several segments,
/// each tagged with a sequence number; the pieces are joined in order.
pub fn extract_icc_profile(data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }

    let mut chunks: Vec<(u8, &[u8])> = Vec::new();
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            break;
        }
        let marker = data[pos + 1];
        // Fill bytes
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        // Start of scan or end of image: no more metadata segments
        if marker == 0xDA || marker == 0xD9 {
            break;
        }

        let segment_length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let segment_end = pos + 2 + segment_length;
        if segment_length < 2 || segment_end > data.len() {
            break;
        }

        let segment = &data[pos + 4..segment_end];
        if marker == 0xE2 && segment.len() > ICC_MARKER.len() + 2 && segment.starts_with(ICC_MARKER)
        {
            let sequence = segment[ICC_MARKER.len()];
            chunks.push((sequence, &segment[ICC_MARKER.len() + 2..]));
        }
        pos = segment_end;
    }

    if chunks.is_empty() {
        return None;
    }
    chunks.sort_by_key(|(sequence, _)| *sequence);
    let profile: Vec<u8> = chunks.into_iter().flat_map(|(_, c)| c.iter().copied()).collect();
    debug!("Found ICC profile in JPEG: {} bytes", profile.len());
    Some(profile)
}

/// Encode as baseline JPEG. Alpha is dropped.
pub fn encode(
    image: &RgbaImage,
    quality: u8,
    icc_profile: Option<&[u8]>,
) -> Result<Vec<u8>, WatermarkError> {
    let rgb_image: RgbImage = image.convert();
    let mut output = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);

    if let Some(profile_data) = icc_profile {
        match encoder.set_icc_profile(profile_data.to_vec()) {
            Ok(()) => debug!("Embedding ICC profile in JPEG: {} bytes", profile_data.len()),
            Err(e) => debug!(
                "Failed to set ICC profile on JPEG encoder ({}), using standard JPEG",
                e
            ),
        }
    }

    encoder
        .write_image(
            &rgb_image,
            rgb_image.width(),
            rgb_image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| WatermarkError::encode(ExportFormat::Jpeg, e.to_string()))?;

    Ok(output)
}

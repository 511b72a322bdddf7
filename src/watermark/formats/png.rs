use flate2::read::ZlibDecoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage, codecs::png::PngEncoder};
use std::io::Read;
use tracing::debug;

use crate::watermark::{ExportFormat, WatermarkError};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Extract and inflate the ICC profile from a PNG `iCCP` chunk.
pub fn extract_icc_profile(data: &[u8]) -> Option<Vec<u8>> {
    if !data.starts_with(PNG_SIGNATURE) {
        return None;
    }

    let mut pos = PNG_SIGNATURE.len();
    while pos + 12 <= data.len() {
        let chunk_length =
            u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let chunk_type = &data[pos + 4..pos + 8];
        let chunk_start = pos + 8;
        let chunk_end = chunk_start.checked_add(chunk_length)?;
        if chunk_end + 4 > data.len() {
            return None;
        }

        match chunk_type {
            b"iCCP" => return inflate_iccp(&data[chunk_start..chunk_end]),
            // The profile must precede the image data
            b"IDAT" | b"IEND" => return None,
            _ => {}
        }

        // Length + type + data + CRC
        pos = chunk_end + 4;
    }

    None
}

/// `iCCP` layout: null-terminated profile name, compression method (0 is
/// deflate), compressed profile.
fn inflate_iccp(chunk: &[u8]) -> Option<Vec<u8>> {
    let null_pos = chunk.iter().position(|&b| b == 0)?;
    if null_pos + 2 > chunk.len() || chunk[null_pos + 1] != 0 {
        return None;
    }

    let mut decoder = ZlibDecoder::new(&chunk[null_pos + 2..]);
    let mut profile = Vec::new();
    decoder.read_to_end(&mut profile).ok()?;
    debug!(
        "Found ICC profile in PNG: {} bytes (decompressed)",
        profile.len()
    );
    Some(profile)
}

/// Encode as RGBA PNG.
pub fn encode(image: &RgbaImage) -> Result<Vec<u8>, WatermarkError> {
    let mut output = Vec::new();
    PngEncoder::new(&mut output)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| WatermarkError::encode(ExportFormat::Png, e.to_string()))?;
    Ok(output)
}

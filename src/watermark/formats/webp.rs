use image::buffer::ConvertBuffer;
use image::{RgbImage, RgbaImage};
use tracing::debug;

use crate::watermark::{ExportFormat, WatermarkError};

/// Encode as lossy WebP. `quality` is on libwebp's 0..=100 scale.
pub fn encode(
    image: &RgbaImage,
    quality: f32,
    icc_profile: Option<&[u8]>,
) -> Result<Vec<u8>, WatermarkError> {
    let rgb_image: RgbImage = image.convert();
    let (width, height) = rgb_image.dimensions();

    let encoded = webp::Encoder::from_rgb(rgb_image.as_raw(), width, height)
        .encode_simple(false, quality)
        .map_err(|e| WatermarkError::encode(ExportFormat::WebP, format!("{:?}", e)))?;

    match icc_profile {
        Some(profile) => {
            let with_profile = add_icc_profile(&encoded, profile)?;
            debug!("WebP written with ICC profile: {} bytes", profile.len());
            Ok(with_profile)
        }
        None => Ok(encoded.to_vec()),
    }
}

/// Attach an `ICCP` chunk to an encoded WebP bitstream through libwebp's
/// mux API, which also rewrites the container as extended (VP8X).
pub fn add_icc_profile(webp_data: &[u8], icc_profile: &[u8]) -> Result<Vec<u8>, WatermarkError> {
    let mux_error = |step: &str| WatermarkError::encode(ExportFormat::WebP, format!("mux {} failed", step));

    unsafe {
        let input_data = libwebp_sys::WebPData {
            bytes: webp_data.as_ptr(),
            size: webp_data.len(),
        };

        let mux = libwebp_sys::WebPMuxNew();
        if mux.is_null() {
            return Err(mux_error("allocation"));
        }

        if libwebp_sys::WebPMuxSetImage(mux, &input_data, 1) != libwebp_sys::WebPMuxError::WEBP_MUX_OK
        {
            libwebp_sys::WebPMuxDelete(mux);
            return Err(mux_error("set image"));
        }

        let icc_data = libwebp_sys::WebPData {
            bytes: icc_profile.as_ptr(),
            size: icc_profile.len(),
        };
        if libwebp_sys::WebPMuxSetChunk(mux, c"ICCP".as_ptr(), &icc_data, 1)
            != libwebp_sys::WebPMuxError::WEBP_MUX_OK
        {
            libwebp_sys::WebPMuxDelete(mux);
            return Err(mux_error("set ICCP chunk"));
        }

        let mut assembled = libwebp_sys::WebPData {
            bytes: std::ptr::null(),
            size: 0,
        };
        if libwebp_sys::WebPMuxAssemble(mux, &mut assembled) != libwebp_sys::WebPMuxError::WEBP_MUX_OK
        {
            libwebp_sys::WebPMuxDelete(mux);
            return Err(mux_error("assemble"));
        }

        let result = if assembled.size > 0 && !assembled.bytes.is_null() {
            Ok(std::slice::from_raw_parts(assembled.bytes, assembled.size).to_vec())
        } else {
            Err(mux_error("assemble"))
        };

        libwebp_sys::WebPDataClear(&mut assembled);
        libwebp_sys::WebPMuxDelete(mux);
        result
    }
}

use super::types::ExportFormat;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    #[error("Failed to encode {format}: {reason}")]
    EncodeError {
        format: ExportFormat,
        reason: String,
    },

    #[error("Font error: {0}")]
    FontError(String),

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Render task failed: {0}")]
    TaskError(String),
}

impl WatermarkError {
    pub(crate) fn encode(format: ExportFormat, reason: impl Into<String>) -> Self {
        WatermarkError::EncodeError {
            format,
            reason: reason.into(),
        }
    }
}

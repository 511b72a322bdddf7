use crate::Config;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum StartupCheckError {
    #[error("Failed to create output directory: {0}")]
    OutputDirectoryCreationFailed(#[from] std::io::Error),

    #[error("Font file for '{0}' does not exist: {1:?}")]
    FontFileMissing(String, PathBuf),

    #[error("No usable font is configured")]
    NoFontsConfigured,

    #[error("Logo file does not exist: {0:?}")]
    LogoFileMissing(PathBuf),

    #[error("Invalid watermark settings: {0}")]
    InvalidWatermark(String),
}

impl StartupCheckError {
    /// Errors that make rendering impossible, as opposed to ones that only
    /// degrade the output.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            StartupCheckError::OutputDirectoryCreationFailed(_)
                | StartupCheckError::NoFontsConfigured
                | StartupCheckError::InvalidWatermark(_)
        )
    }
}

pub async fn perform_startup_checks(config: &Config) -> Result<(), Vec<StartupCheckError>> {
    let mut errors = Vec::new();

    info!("Performing startup checks...");

    if let Err(e) = config.watermark.validate() {
        error!("Watermark settings are invalid: {}", e);
        errors.push(StartupCheckError::InvalidWatermark(e.to_string()));
    }

    let output_dir = &config.export.output_directory;
    if !output_dir.exists() {
        info!("Output directory does not exist, creating: {:?}", output_dir);
        if let Err(e) = tokio::fs::create_dir_all(output_dir).await {
            error!("Failed to create output directory: {}", e);
            errors.push(StartupCheckError::OutputDirectoryCreationFailed(e));
        } else {
            info!("Output directory created successfully");
        }
    } else {
        info!("Output directory exists: {:?}", output_dir);
    }

    if config.fonts.is_empty() {
        error!("No fonts configured, add a [[fonts]] entry");
        errors.push(StartupCheckError::NoFontsConfigured);
    }
    let mut fonts_found = 0;
    for font in &config.fonts {
        if font.path.exists() {
            info!("Font '{}' found: {:?}", font.family, font.path);
            fonts_found += 1;
        } else {
            warn!("Font '{}' file missing: {:?}", font.family, font.path);
            errors.push(StartupCheckError::FontFileMissing(
                font.family.clone(),
                font.path.clone(),
            ));
        }
    }
    if !config.fonts.is_empty() && fonts_found == 0 {
        errors.push(StartupCheckError::NoFontsConfigured);
    }

    if let Some(logo) = &config.watermark.logo {
        if logo.exists() {
            info!("Logo file exists: {:?}", logo);
        } else {
            warn!("Logo file does not exist, watermarks will have no logo: {:?}", logo);
            errors.push(StartupCheckError::LogoFileMissing(logo.clone()));
        }
    }

    if errors.is_empty() {
        info!("All startup checks passed");
        Ok(())
    } else {
        error!("Startup checks failed with {} errors", errors.len());
        Err(errors)
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub mod batch;
pub mod export;
pub mod startup_checks;
pub mod time_format;
pub mod watermark;

pub use batch::{BatchExporter, BatchItem, BatchOptions, BatchReport, ItemOutcome};
pub use time_format::TimeFormat;
pub use watermark::{FontBook, WatermarkConfig, WatermarkError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml_edit::de::Error),

    #[error("Invalid watermark settings: {0}")]
    Watermark(#[from] WatermarkError),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub watermark: WatermarkConfig,
    #[serde(default)]
    pub fonts: Vec<FontEntry>,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FontEntry {
    pub family: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_directory: PathBuf,
    pub pacing_ms: u64,
    pub rename_pattern: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("watermarked"),
            pacing_ms: 300,
            rename_pattern: export::DEFAULT_RENAME_PATTERN.to_string(),
        }
    }
}

impl ExportConfig {
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            pacing: Duration::from_millis(self.pacing_ms),
            rename_pattern: self.rename_pattern.clone(),
            output_directory: Some(self.output_directory.clone()),
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml_edit::de::from_str::<Config>(content)?)
    }

    /// Load from `path`, or use defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!("Configuration loaded from: {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.watermark.validate()?;
        Ok(())
    }

    /// Register every configured font. Fonts that fail to load are skipped.
    pub fn font_book(&self) -> FontBook {
        let mut book = FontBook::new();
        for entry in &self.fonts {
            match book.load_file(&entry.family, &entry.path) {
                Ok(()) => info!("Registered font '{}' from {:?}", entry.family, entry.path),
                Err(e) => warn!(
                    "Failed to load font '{}' from {:?}: {}",
                    entry.family, entry.path, e
                ),
            }
        }
        book
    }
}

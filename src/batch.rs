use chrono::NaiveDateTime;
use image::{GenericImageView, RgbaImage};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::export::{self, RenameContext};
use crate::time_format;
use crate::watermark::{
    RenderTarget, TextPainter, WatermarkConfig, WatermarkError, build_lines, formats, render,
    resolve,
};

/// One source image handed to the batch: the name it was selected under and
/// its encoded bytes.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl BatchItem {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub async fn read(path: &Path) -> Result<Self, WatermarkError> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { name, bytes })
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Delay between consecutive items.
    pub pacing: Duration,
    pub rename_pattern: String,
    /// Rendered files are written here when set; otherwise they are only
    /// returned in the report.
    pub output_directory: Option<PathBuf>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(300),
            rename_pattern: export::DEFAULT_RENAME_PATTERN.to_string(),
            output_directory: None,
        }
    }
}

/// Encoded output of a single render.
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub filename: String,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub written_to: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ItemOutcome {
    /// Position in the submitted list, 0-based.
    pub index: usize,
    pub name: String,
    pub result: Result<RenderedImage, WatermarkError>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
    /// Set when the batch stopped before reaching every item.
    pub cancelled: bool,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }
}

pub type LogoDigest = [u8; 32];

pub fn logo_digest(bytes: &[u8]) -> LogoDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Decoded logo keyed by the SHA-256 of its bytes.
///
/// Holds a single entry: a lookup with different bytes replaces it. Decode
/// failures are cached as `None` so a broken logo is only tried once.
#[derive(Debug, Default)]
pub struct LogoCache {
    entry: Option<(LogoDigest, Option<Arc<RgbaImage>>)>,
}

impl LogoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for `digest`. The outer `None` means a miss.
    pub fn get(&self, digest: &LogoDigest) -> Option<Option<Arc<RgbaImage>>> {
        match &self.entry {
            Some((cached, logo)) if cached == digest => Some(logo.clone()),
            _ => None,
        }
    }

    pub fn insert(&mut self, digest: LogoDigest, logo: Option<Arc<RgbaImage>>) {
        self.entry = Some((digest, logo));
    }

    pub fn get_or_decode(&mut self, bytes: &[u8]) -> Option<Arc<RgbaImage>> {
        let digest = logo_digest(bytes);
        if let Some(logo) = self.get(&digest) {
            return logo;
        }
        let logo = decode_logo(bytes);
        self.insert(digest, logo.clone());
        logo
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

fn decode_logo(bytes: &[u8]) -> Option<Arc<RgbaImage>> {
    match image::load_from_memory(bytes) {
        Ok(img) => {
            debug!("Decoded logo {}x{}", img.width(), img.height());
            Some(Arc::new(img.to_rgba8()))
        }
        Err(e) => {
            warn!("Failed to decode logo, rendering without it: {}", e);
            None
        }
    }
}

/// Result of rendering one encoded source image.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured: Option<NaiveDateTime>,
}

/// Decode, lay out, draw and encode one image. CPU bound; run it off the
/// async runtime.
pub fn render_bytes(
    source: &[u8],
    config: &WatermarkConfig,
    logo: Option<&RgbaImage>,
    painter: &dyn TextPainter,
) -> Result<RenderOutput, WatermarkError> {
    let img = image::load_from_memory(source)
        .map_err(|e| WatermarkError::DecodeError(e.to_string()))?;
    let (width, height) = img.dimensions();

    let icc_profile = formats::extract_icc_profile(source);
    let captured = if config.use_exif_time {
        time_format::capture_time(source)
    } else {
        None
    };
    let display_time = time_format::display_time(config, captured);
    let lines = build_lines(config, &display_time);

    let layout = resolve(
        RenderTarget::new(width, height),
        config,
        &lines,
        logo.map(|l| l.dimensions()),
        painter,
    );
    let data = render(&img, &layout, config, logo, painter, icc_profile.as_deref())?;

    Ok(RenderOutput {
        data,
        width,
        height,
        captured,
    })
}

/// Renders a list of images one after another with a fixed delay between
/// them. A failing item is recorded and the batch moves on.
pub struct BatchExporter {
    config: Arc<WatermarkConfig>,
    painter: Arc<dyn TextPainter>,
    options: BatchOptions,
    logo_bytes: Option<Arc<Vec<u8>>>,
    logo_cache: LogoCache,
}

impl BatchExporter {
    pub fn new(
        config: WatermarkConfig,
        painter: Arc<dyn TextPainter>,
        options: BatchOptions,
    ) -> Result<Self, WatermarkError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            painter,
            options,
            logo_bytes: None,
            logo_cache: LogoCache::new(),
        })
    }

    /// Use these bytes as the logo for following batches. The cached decode
    /// is dropped when the bytes differ from the cached ones.
    pub fn set_logo(&mut self, bytes: Option<Vec<u8>>) {
        if let Some(bytes) = &bytes
            && self.logo_cache.get(&logo_digest(bytes)).is_some()
        {
            debug!("Logo unchanged, keeping cached decode");
        } else {
            self.logo_cache.invalidate();
        }
        self.logo_bytes = bytes.map(Arc::new);
    }

    /// Read the configured logo file. A missing or unreadable file leaves
    /// the watermark without a logo.
    pub async fn load_configured_logo(&mut self) {
        let Some(path) = self.config.logo.clone() else {
            self.set_logo(None);
            return;
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!("Read logo {:?} ({} bytes)", path, bytes.len());
                self.set_logo(Some(bytes));
            }
            Err(e) => {
                warn!("Failed to read logo {:?}: {}", path, e);
                self.set_logo(None);
            }
        }
    }

    async fn logo(&mut self) -> Option<Arc<RgbaImage>> {
        let bytes = self.logo_bytes.clone()?;
        let digest = logo_digest(&bytes);
        if let Some(logo) = self.logo_cache.get(&digest) {
            return logo;
        }

        let logo = tokio::task::spawn_blocking(move || decode_logo(&bytes))
            .await
            .unwrap_or_else(|e| {
                error!("Logo decode task failed: {}", e);
                None
            });
        self.logo_cache.insert(digest, logo.clone());
        logo
    }

    pub async fn run(&mut self, items: Vec<BatchItem>, cancel: &CancellationToken) -> BatchReport {
        let mut report = BatchReport::default();
        let total = items.len();
        info!("Exporting {} images as {}", total, self.config.export_format);

        if let Some(dir) = &self.options.output_directory
            && let Err(e) = tokio::fs::create_dir_all(dir).await
        {
            warn!("Failed to create output directory {:?}: {}", dir, e);
        }

        let logo = self.logo().await;
        let mut taken_names = HashSet::new();

        for (index, item) in items.into_iter().enumerate() {
            if index > 0 && !self.options.pacing.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.options.pacing) => {}
                }
            }
            if cancel.is_cancelled() {
                info!("Export cancelled after {} of {} images", index, total);
                report.cancelled = true;
                break;
            }

            let name = item.name.clone();
            let result = self
                .export_item(index, item, logo.clone(), &mut taken_names)
                .await;
            match &result {
                Ok(rendered) => info!(
                    "[{}/{}] {} -> {} ({} bytes)",
                    index + 1,
                    total,
                    name,
                    rendered.filename,
                    rendered.data.len()
                ),
                Err(e) => error!("[{}/{}] {} failed: {}", index + 1, total, name, e),
            }
            report.outcomes.push(ItemOutcome {
                index,
                name,
                result,
            });
        }

        info!(
            "Export finished: {} succeeded, {} failed",
            report.succeeded(),
            report.failed()
        );
        report
    }

    async fn export_item(
        &self,
        index: usize,
        item: BatchItem,
        logo: Option<Arc<RgbaImage>>,
        taken_names: &mut HashSet<String>,
    ) -> Result<RenderedImage, WatermarkError> {
        let config = self.config.clone();
        let painter = self.painter.clone();
        let bytes = item.bytes;

        let output = tokio::task::spawn_blocking(move || {
            render_bytes(&bytes, &config, logo.as_deref(), painter.as_ref())
        })
        .await
        .map_err(|e| WatermarkError::TaskError(e.to_string()))??;

        let ctx = RenameContext::new(&item.name, index + 1, chrono::Local::now().naive_local())
            .with_labels(&self.config.area, &self.config.content)
            .with_capture_time(output.captured);
        let wanted =
            export::export_filename(&self.options.rename_pattern, &ctx, self.config.export_format);
        let filename = export::unique_filename(&wanted, taken_names);
        if filename != wanted {
            warn!("{} already used in this batch, writing {} instead", wanted, filename);
        }
        taken_names.insert(filename.clone());

        let written_to = match &self.options.output_directory {
            Some(dir) => {
                let path = dir.join(&filename);
                tokio::fs::write(&path, &output.data).await?;
                debug!("Wrote {:?}", path);
                Some(path)
            }
            None => None,
        };

        Ok(RenderedImage {
            filename,
            data: output.data,
            width: output.width,
            height: output.height,
            written_to,
        })
    }
}

use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use std::collections::HashSet;

use crate::watermark::ExportFormat;

pub const DEFAULT_RENAME_PATTERN: &str = "{name}_watermarked";

/// Replace characters that are unsafe in file names and runs of whitespace
/// with `_`, then collapse repeated underscores.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_whitespace() || matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
        {
            '_'
        } else {
            c
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out
}

/// File name without its final extension, `photo.final.jpg` → `photo.final`.
/// A dot file such as `.hidden` has an empty stem.
pub fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) if dot + 1 < name.len() && !name[dot + 1..].contains(['/', '\\']) => {
            &name[..dot]
        }
        _ => name,
    }
}

/// Values available to rename patterns.
#[derive(Debug, Clone, Serialize)]
pub struct RenameContext {
    /// Original file stem.
    pub name: String,
    /// 1-based position in the batch.
    pub index: usize,
    /// Export date, `YYYYMMDD`.
    pub date: String,
    /// Export time, `HHMMSS`.
    pub time: String,
    pub area: String,
    pub content: String,
    pub exif_time: Option<String>,
}

impl RenameContext {
    pub fn new(original_name: &str, index: usize, exported_at: NaiveDateTime) -> Self {
        Self {
            name: file_stem(original_name).to_string(),
            index,
            date: exported_at.format("%Y%m%d").to_string(),
            time: format!(
                "{:02}{:02}{:02}",
                exported_at.hour(),
                exported_at.minute(),
                exported_at.second()
            ),
            area: String::new(),
            content: String::new(),
            exif_time: None,
        }
    }

    pub fn with_labels(mut self, area: &str, content: &str) -> Self {
        self.area = area.to_string();
        self.content = content.to_string();
        self
    }

    pub fn with_capture_time(mut self, captured: Option<NaiveDateTime>) -> Self {
        self.exif_time = captured.map(|dt| dt.format("%Y%m%d_%H%M%S").to_string());
        self
    }
}

/// Expand `{name}`, `{index}`, `{date}`, `{time}`, `{area}`, `{content}`
/// and `{exif_time}` in a rename pattern.
pub fn apply_pattern(pattern: &str, ctx: &RenameContext) -> String {
    pattern
        .replace("{name}", &ctx.name)
        .replace("{index}", &format!("{:03}", ctx.index))
        .replace("{date}", &ctx.date)
        .replace("{time}", &ctx.time)
        .replace("{area}", &ctx.area)
        .replace("{content}", &ctx.content)
        .replace("{exif_time}", ctx.exif_time.as_deref().unwrap_or("no_time"))
}

/// Output file name for one exported image.
///
/// The expanded pattern is sanitized and given the codec's extension. An
/// item whose name yields an empty stem is called `image_<index>`.
pub fn export_filename(pattern: &str, ctx: &RenameContext, format: ExportFormat) -> String {
    let mut ctx = ctx.clone();
    if ctx.name.trim().is_empty() {
        ctx.name = format!("image_{}", ctx.index);
    }

    let mut stem = sanitize_filename(&apply_pattern(pattern, &ctx));
    if stem.trim_matches('_').is_empty() {
        stem = format!("image_{}", ctx.index);
    }
    format!("{}.{}", stem, format.extension())
}

/// `filename` itself when no earlier item of the batch took it, otherwise
/// the first free `<stem>_<n>.<ext>` counting from 2.
pub fn unique_filename(filename: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(filename) {
        return filename.to_string();
    }
    let (stem, ext) = match filename.rfind('.') {
        Some(dot) => filename.split_at(dot),
        None => (filename, ""),
    };
    (2..)
        .map(|n| format!("{}_{}{}", stem, n, ext))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| filename.to_string())
}

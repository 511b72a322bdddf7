use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, trace};

use crate::watermark::{WatermarkConfig, WatermarkError};

/// The four display layouts offered for the capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeFormat {
    #[default]
    #[serde(rename = "YYYY.MM.DD HH:mm:ss")]
    DotSeconds,
    #[serde(rename = "YYYY-MM-DD HH:mm:ss")]
    DashSeconds,
    #[serde(rename = "YYYY-MM-DD HH:mm")]
    DashMinutes,
    #[serde(rename = "YYYY年MM月DD日 HH:mm")]
    Chinese,
}

impl TimeFormat {
    pub const ALL: [TimeFormat; 4] = [
        TimeFormat::DotSeconds,
        TimeFormat::DashSeconds,
        TimeFormat::DashMinutes,
        TimeFormat::Chinese,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            TimeFormat::DotSeconds => "YYYY.MM.DD HH:mm:ss",
            TimeFormat::DashSeconds => "YYYY-MM-DD HH:mm:ss",
            TimeFormat::DashMinutes => "YYYY-MM-DD HH:mm",
            TimeFormat::Chinese => "YYYY年MM月DD日 HH:mm",
        }
    }

    pub fn format(&self, dt: &NaiveDateTime) -> String {
        let (y, mo, d) = (dt.year(), dt.month(), dt.day());
        let (h, mi, s) = (dt.hour(), dt.minute(), dt.second());
        match self {
            TimeFormat::DotSeconds => {
                format!("{:04}.{:02}.{:02} {:02}:{:02}:{:02}", y, mo, d, h, mi, s)
            }
            TimeFormat::DashSeconds => {
                format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, mo, d, h, mi, s)
            }
            TimeFormat::DashMinutes => format!("{:04}-{:02}-{:02} {:02}:{:02}", y, mo, d, h, mi),
            TimeFormat::Chinese => format!("{:04}年{:02}月{:02}日 {:02}:{:02}", y, mo, d, h, mi),
        }
    }

    /// Reformat a raw time string. Strings without a recognisable
    /// date-time come back unchanged.
    pub fn apply(&self, raw: &str) -> String {
        match parse_raw_time(raw) {
            Some(dt) => self.format(&dt),
            None => {
                trace!("Time string {:?} not recognised, displaying as-is", raw);
                raw.to_string()
            }
        }
    }
}

impl fmt::Display for TimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for TimeFormat {
    type Err = WatermarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeFormat::ALL
            .into_iter()
            .find(|format| format.key() == s)
            .ok_or_else(|| WatermarkError::InvalidConfig(format!("unknown time format '{}'", s)))
    }
}

/// Parse any `Y?M?D?h?m[?s]` shaped string, whatever the separators: the
/// EXIF `2025:11:29 14:30:00` form, the dotted and dashed display forms and
/// the `年月日` form all parse. Seconds default to zero.
pub fn parse_raw_time(raw: &str) -> Option<NaiveDateTime> {
    let fields: Vec<u32> = raw
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u32>())
        .collect::<Result<_, _>>()
        .ok()?;

    if !(5..=6).contains(&fields.len()) || fields[0] < 1000 {
        return None;
    }

    let second = fields.get(5).copied().unwrap_or(0);
    NaiveDate::from_ymd_opt(fields[0] as i32, fields[1], fields[2])?.and_hms_opt(
        fields[3],
        fields[4],
        second,
    )
}

/// Capture time from the image's EXIF block, preferring the original
/// capture over digitisation and modification times.
pub fn capture_time(image_bytes: &[u8]) -> Option<NaiveDateTime> {
    let exif = match rexif::parse_buffer(image_bytes) {
        Ok(exif) => exif,
        Err(e) => {
            trace!("No EXIF data: {}", e);
            return None;
        }
    };

    let date_fields = [
        rexif::ExifTag::DateTimeOriginal,
        rexif::ExifTag::DateTimeDigitized,
        rexif::ExifTag::DateTime,
    ];

    for field in &date_fields {
        if let Some(entry) = exif.entries.iter().find(|e| e.tag == *field)
            && let Some(dt) = parse_raw_time(&entry.value_more_readable)
        {
            debug!("Found capture time in {:?}: {}", field, dt);
            return Some(dt);
        }
    }

    None
}

/// The string shown on the time line.
///
/// With `use_exif_time` the capture time is used, or the current local time
/// when the image has none. Otherwise the configured custom time is used.
pub fn display_time(config: &WatermarkConfig, captured: Option<NaiveDateTime>) -> String {
    if config.use_exif_time {
        let dt = captured.unwrap_or_else(|| chrono::Local::now().naive_local());
        config.time_format.format(&dt)
    } else {
        config.time_format.apply(&config.custom_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 29)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_all_four_layouts() {
        let dt = sample();
        assert_eq!(TimeFormat::DotSeconds.format(&dt), "2025.11.29 14:30:00");
        assert_eq!(TimeFormat::DashSeconds.format(&dt), "2025-11-29 14:30:00");
        assert_eq!(TimeFormat::DashMinutes.format(&dt), "2025-11-29 14:30");
        assert_eq!(TimeFormat::Chinese.format(&dt), "2025年11月29日 14:30");
    }

    #[test]
    fn test_apply_reformats_any_separator_style() {
        for raw in [
            "2025.11.29 14:30:00",
            "2025:11:29 14:30:00",
            "2025-11-29 14:30",
            "2025年11月29日 14:30",
        ] {
            assert_eq!(TimeFormat::DashSeconds.apply(raw), "2025-11-29 14:30:00");
        }
    }

    #[test]
    fn test_apply_leaves_unrecognised_text() {
        assert_eq!(TimeFormat::Chinese.apply("无EXIF数据"), "无EXIF数据");
        assert_eq!(TimeFormat::Chinese.apply(""), "");
        // Month 13 is not a date
        assert_eq!(
            TimeFormat::DotSeconds.apply("2025-13-01 00:00:00"),
            "2025-13-01 00:00:00"
        );
    }

    #[test]
    fn test_format_keys_parse() {
        for format in TimeFormat::ALL {
            assert_eq!(format.key().parse::<TimeFormat>().unwrap(), format);
        }
        assert!("HH:mm".parse::<TimeFormat>().is_err());
    }

    #[test]
    fn test_display_time_prefers_exif() {
        let config = WatermarkConfig {
            time_format: TimeFormat::DashMinutes,
            ..Default::default()
        };
        assert_eq!(display_time(&config, Some(sample())), "2025-11-29 14:30");
    }

    #[test]
    fn test_display_time_custom() {
        let config = WatermarkConfig {
            use_exif_time: false,
            custom_time: "2024.01.02 03:04:05".to_string(),
            time_format: TimeFormat::Chinese,
            ..Default::default()
        };
        assert_eq!(display_time(&config, Some(sample())), "2024年01月02日 03:04");
    }

    #[test]
    fn test_display_time_without_exif_uses_now() {
        let config = WatermarkConfig::default();
        let shown = display_time(&config, None);
        assert!(parse_raw_time(&shown).is_some());
    }

    #[test]
    fn test_capture_time_missing_exif() {
        assert!(capture_time(b"not an image").is_none());
    }
}

//! Turns stored nights into rows a list screen can show.
//!
//! Formatting belongs to the host; `PlainNightFormatter` is the default used
//! when the host does not supply its own.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, TimeZone};

use crate::config::DEFAULT_TIME_FORMAT;
use crate::types::{DisplayRow, SleepNight, SleepQuality};

pub trait NightFormatter: Send + Sync {
    fn format(&self, nights: &[SleepNight]) -> Vec<DisplayRow>;
}

/// Renders timestamps in local time with a chrono pattern.
#[derive(Debug, Clone)]
pub struct PlainNightFormatter {
    time_format: String,
}

impl Default for PlainNightFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_FORMAT)
    }
}

impl PlainNightFormatter {
    /// An unparseable pattern falls back to `DEFAULT_TIME_FORMAT`.
    pub fn new(time_format: impl Into<String>) -> Self {
        let mut time_format = time_format.into();
        if !is_valid_pattern(&time_format) {
            tracing::warn!(pattern = %time_format, "Invalid time format; using default");
            time_format = DEFAULT_TIME_FORMAT.to_string();
        }
        Self { time_format }
    }

    pub fn format_time(&self, millis: i64) -> String {
        match local_time(millis) {
            Some(time) => time.format(&self.time_format).to_string(),
            None => millis.to_string(),
        }
    }

    fn format_row(&self, night: &SleepNight) -> DisplayRow {
        let (end, duration) = if night.is_open() {
            (None, None)
        } else {
            (
                Some(self.format_time(night.end_time_milli)),
                Some(format_duration(night.duration_milli())),
            )
        };

        DisplayRow {
            night_id: night.night_id,
            start: self.format_time(night.start_time_milli),
            end,
            duration,
            quality: quality_label(night.sleep_quality).to_string(),
        }
    }
}

impl NightFormatter for PlainNightFormatter {
    fn format(&self, nights: &[SleepNight]) -> Vec<DisplayRow> {
        nights.iter().map(|night| self.format_row(night)).collect()
    }
}

fn is_valid_pattern(pattern: &str) -> bool {
    StrftimeItems::new(pattern).all(|item| !matches!(item, Item::Error))
}

fn local_time(millis: i64) -> Option<DateTime<Local>> {
    Local.timestamp_millis_opt(millis).single()
}

pub fn quality_label(value: i32) -> &'static str {
    SleepQuality::from_value(value)
        .map(|quality| quality.label())
        .unwrap_or("--")
}

/// `Hh MMm`; negative spans (clock went backwards) render as zero.
pub fn format_duration(millis: i64) -> String {
    let minutes = millis.max(0) / 60_000;
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}

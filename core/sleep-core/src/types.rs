//! Core types shared by the coordinator, the storage layer and hosts.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// Nights
// ═══════════════════════════════════════════════════════════════════════════════

/// Quality value stored for a night nobody has rated yet.
pub const UNRATED_QUALITY: i32 = -1;

/// One recorded sleep interval.
///
/// A night is open ("tonight") while `end_time_milli == start_time_milli`.
/// `night_id` is `0` until storage assigns one on insert.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SleepNight {
    pub night_id: i64,
    pub start_time_milli: i64,
    pub end_time_milli: i64,
    pub sleep_quality: i32,
}

impl SleepNight {
    /// Creates an unsaved, open night starting at `now_milli`.
    pub fn starting_at(now_milli: i64) -> Self {
        Self {
            night_id: 0,
            start_time_milli: now_milli,
            end_time_milli: now_milli,
            sleep_quality: UNRATED_QUALITY,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time_milli == self.start_time_milli
    }

    pub fn duration_milli(&self) -> i64 {
        self.end_time_milli - self.start_time_milli
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Quality
// ═══════════════════════════════════════════════════════════════════════════════

/// Rating scale for `SleepNight::sleep_quality`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepQuality {
    VeryBad,
    Poor,
    SoSo,
    Ok,
    PrettyGood,
    Excellent,
}

impl SleepQuality {
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(SleepQuality::VeryBad),
            1 => Some(SleepQuality::Poor),
            2 => Some(SleepQuality::SoSo),
            3 => Some(SleepQuality::Ok),
            4 => Some(SleepQuality::PrettyGood),
            5 => Some(SleepQuality::Excellent),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SleepQuality::VeryBad => "Very bad",
            SleepQuality::Poor => "Poor",
            SleepQuality::SoSo => "So-so",
            SleepQuality::Ok => "OK",
            SleepQuality::PrettyGood => "Pretty good",
            SleepQuality::Excellent => "Excellent",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Display
// ═══════════════════════════════════════════════════════════════════════════════

/// A night rendered for a list screen.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DisplayRow {
    pub night_id: i64,
    pub start: String,
    /// `None` while the night is still open.
    pub end: Option<String>,
    pub duration: Option<String>,
    pub quality: String,
}

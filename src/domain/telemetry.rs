// Telemetry data domain models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub time_ms: i64,
    /// None is an empty reading
    pub value: Option<f64>,
}

impl TimeSeriesPoint {
    pub fn new(time_ms: i64, value: Option<f64>) -> Self {
        Self { time_ms, value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<TimeSeriesPoint>,
}

impl Series {
    pub fn new(name: impl Into<String>, points: Vec<TimeSeriesPoint>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }
}

/// Inclusive time range in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeWindow {
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }

    /// Saturates at the `i64` millisecond range
    pub fn from_unix_seconds(start: i64, end: i64) -> Self {
        Self::new(start.saturating_mul(1000), end.saturating_mul(1000))
    }

    /// None when either bound does not fit in epoch milliseconds
    pub fn checked_from_unix_seconds(start: i64, end: i64) -> Option<Self> {
        Some(Self::new(start.checked_mul(1000)?, end.checked_mul(1000)?))
    }

    pub fn contains(&self, time_ms: i64) -> bool {
        time_ms >= self.start_ms && time_ms <= self.end_ms
    }

    pub fn is_valid(&self) -> bool {
        self.start_ms <= self.end_ms
    }

    pub fn shifted(&self, offset_ms: i64) -> Self {
        Self::new(
            self.start_ms.saturating_add(offset_ms),
            self.end_ms.saturating_add(offset_ms),
        )
    }

    pub fn start_secs(&self) -> i64 {
        self.start_ms.div_euclid(1000)
    }

    pub fn end_secs(&self) -> i64 {
        self.end_ms.div_euclid(1000)
    }
}

/// A window is live while its end is less than one hour behind `now_ms`
pub fn is_live_window(end_ms: i64, now_ms: i64) -> bool {
    now_ms.saturating_sub(end_ms) < LIVE_WINDOW_MS
}

pub const LIVE_WINDOW_MS: i64 = 3_600_000;

/// Table timestamp, e.g. `19/02/2025 13:05:00`
pub fn format_timestamp(time_ms: i64) -> String {
    format_with(time_ms, "%d/%m/%Y %H:%M:%S")
}

/// Export timestamp, e.g. `2025-02-19 13:05:00`
pub fn format_export_timestamp(time_ms: i64) -> String {
    format_with(time_ms, "%Y-%m-%d %H:%M:%S")
}

fn format_with(time_ms: i64, pattern: &str) -> String {
    match DateTime::<Utc>::from_timestamp_millis(time_ms) {
        Some(dt) => dt.format(pattern).to_string(),
        None => time_ms.to_string(),
    }
}

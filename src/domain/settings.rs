// Site and per-tag display settings
use super::grouping::{GroupingDepth, SortOrder};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DATE_INPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DEFAULT_MAX_DECIMAL: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteSettings {
    pub dark_mode: bool,
    pub sort_order: SortOrder,
    pub grouping_mode: GroupingDepth,
    /// Hours added to every timestamp before display
    pub data_offset: f64,
    pub barge_name: String,
    pub barge_number: String,
    pub forward_fill: bool,
    /// Auto-refresh period in milliseconds
    pub poll_interval: u64,
    pub start_date: String,
    pub end_date: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            dark_mode: true,
            sort_order: SortOrder::Asc,
            grouping_mode: GroupingDepth::TwoLevel,
            data_offset: 1.0,
            barge_name: String::new(),
            barge_number: String::new(),
            forward_fill: false,
            poll_interval: 5000,
            start_date: String::new(),
            end_date: String::new(),
        }
    }
}

impl SiteSettings {
    /// Blank dates become today at midnight and `now`
    pub fn with_default_dates(mut self, now: NaiveDateTime) -> Self {
        if self.start_date.trim().is_empty() {
            self.start_date = now.date().format("%Y-%m-%d 00:00:00").to_string();
        }
        if self.end_date.trim().is_empty() {
            self.end_date = now.format(DATE_INPUT_FORMAT).to_string();
        }
        self
    }

    /// Offset in milliseconds; non-finite offsets count as zero and huge
    /// ones saturate
    pub fn offset_ms(&self) -> i64 {
        if !self.data_offset.is_finite() {
            return 0;
        }
        (self.data_offset * 3_600_000.0).round() as i64
    }

    pub fn export_file_name(&self) -> String {
        let number = non_blank_or(&self.barge_number, "0000");
        let name = non_blank_or(&self.barge_name, "UnknownBarge");
        format!("{}_{}_export.csv", number, name)
    }
}

fn non_blank_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() { fallback } else { trimmed }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagSettings {
    pub scale_factors: HashMap<String, f64>,
    /// Raw value a tag reports when its reading is invalid
    pub error_value: HashMap<String, f64>,
    pub max_decimal: HashMap<String, u32>,
    pub global_forward_fill: bool,
}

impl TagSettings {
    pub fn scale(&self, tag: &str) -> f64 {
        self.scale_factors.get(tag).copied().unwrap_or(1.0)
    }

    pub fn decimals(&self, tag: &str) -> u32 {
        self.max_decimal.get(tag).copied().unwrap_or(DEFAULT_MAX_DECIMAL)
    }

    /// Error sentinel → empty, then scale and round
    pub fn apply(&self, tag: &str, raw: Option<f64>) -> Option<f64> {
        let value = raw?;
        if self.error_value.get(tag).is_some_and(|sentinel| *sentinel == value) {
            return None;
        }
        Some(round_to(value * self.scale(tag), self.decimals(tag)))
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals.min(15) as i32);
    (value * factor).round() / factor
}

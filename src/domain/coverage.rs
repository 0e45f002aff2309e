// Fetched time ranges per tag, in unix seconds
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type Interval = (i64, i64);

/// Sort and merge overlapping or touching intervals
pub fn union_intervals(intervals: &[Interval]) -> Vec<Interval> {
    let mut sorted = intervals.to_vec();
    sorted.sort_by_key(|iv| iv.0);

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for iv in sorted {
        match merged.last_mut() {
            Some(last) if iv.0 <= last.1 => last.1 = last.1.max(iv.1),
            _ => merged.push(iv),
        }
    }
    merged
}

/// Parts of `[start, end]` not covered by `coverage`
pub fn missing_ranges(coverage: &[Interval], start: i64, end: i64) -> Vec<Interval> {
    let mut missing = Vec::new();
    let mut cursor = start;
    for (cov_start, cov_end) in union_intervals(coverage) {
        if cov_end < cursor || cov_start > end {
            continue;
        }
        if cov_start > cursor {
            missing.push((cursor, cov_start.min(end)));
        }
        cursor = cursor.max(cov_end);
        if cursor > end {
            break;
        }
    }
    if cursor < end {
        missing.push((cursor, end));
    }
    missing.retain(|(s, e)| e > s);
    missing
}

/// Serialised as `{ "tag": [[start, end], ...] }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagCoverage {
    intervals: HashMap<String, Vec<Interval>>,
}

impl TagCoverage {
    pub fn missing(&self, tag: &str, start: i64, end: i64) -> Vec<Interval> {
        let covered = self.intervals.get(tag).map(Vec::as_slice).unwrap_or(&[]);
        missing_ranges(covered, start, end)
    }

    pub fn record(&mut self, tag: &str, interval: Interval) {
        let entry = self.intervals.entry(tag.to_string()).or_default();
        entry.push(interval);
        *entry = union_intervals(entry);
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.intervals.keys().map(String::as_str)
    }

    pub fn remove(&mut self, tag: &str) {
        self.intervals.remove(tag);
    }

    pub fn clear(&mut self) {
        self.intervals.clear();
    }
}

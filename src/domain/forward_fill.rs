// Carry the last known value forward; never looks ahead
use super::telemetry::{Series, TimeSeriesPoint};
use std::collections::BTreeSet;

/// Value of `points` carried forward onto each timestamp of `timeline`.
/// Both inputs must be sorted by time.
pub fn reindex_forward(points: &[TimeSeriesPoint], timeline: &[i64]) -> Vec<TimeSeriesPoint> {
    let mut last = None;
    let mut idx = 0;
    timeline
        .iter()
        .map(|&t| {
            while idx < points.len() && points[idx].time_ms <= t {
                if points[idx].value.is_some() {
                    last = points[idx].value;
                }
                idx += 1;
            }
            TimeSeriesPoint::new(t, last)
        })
        .collect()
}

/// Forward-fill every series onto the union of all their timestamps. Each
/// series only ever carries its own values.
pub fn forward_fill_all(series: &[Series]) -> Vec<Series> {
    let timeline: Vec<i64> = series
        .iter()
        .flat_map(|s| s.points.iter().map(|p| p.time_ms))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    series
        .iter()
        .map(|s| {
            let mut sorted = s.points.clone();
            sorted.sort_by_key(|p| p.time_ms);
            Series::new(s.name.clone(), reindex_forward(&sorted, &timeline))
        })
        .collect()
}

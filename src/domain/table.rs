// Merge several series into one row-oriented table
use super::tag::TIMESTAMP_COLUMN;
use super::telemetry::{format_timestamp, Series, TimeWindow};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub time_ms: i64,
    pub timestamp: String,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedTable {
    /// Series names, in input order
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl MergedTable {
    /// `["Timestamp", name_1, ..., name_N]`
    pub fn header(&self) -> Vec<String> {
        std::iter::once(TIMESTAMP_COLUMN.to_string())
            .chain(self.columns.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Narrow an existing table to a display window without refetching
    pub fn within(&self, window: TimeWindow) -> MergedTable {
        MergedTable {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|r| window.contains(r.time_ms))
                .cloned()
                .collect(),
        }
    }

    /// Rows as `{ "Timestamp": ..., "<column>": value|null }` objects
    pub fn records(&self) -> Vec<RowRecord<'_>> {
        self.rows
            .iter()
            .map(|row| RowRecord {
                columns: &self.columns,
                row,
            })
            .collect()
    }
}

pub struct RowRecord<'a> {
    columns: &'a [String],
    row: &'a TableRow,
}

impl Serialize for RowRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len() + 1))?;
        map.serialize_entry(TIMESTAMP_COLUMN, &self.row.timestamp)?;
        for (column, value) in self.columns.iter().zip(&self.row.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

pub fn merge_series(series: &[Series], window: Option<TimeWindow>) -> MergedTable {
    let in_window = |t: i64| window.map_or(true, |w| w.contains(t));

    let timestamps: BTreeSet<i64> = series
        .iter()
        .flat_map(|s| s.points.iter().map(|p| p.time_ms))
        .filter(|t| in_window(*t))
        .collect();

    // Exact-timestamp lookup per series; the first non-empty reading wins
    let lookups: Vec<HashMap<i64, Option<f64>>> = series
        .iter()
        .map(|s| {
            let mut lookup: HashMap<i64, Option<f64>> = HashMap::with_capacity(s.points.len());
            for p in &s.points {
                let slot = lookup.entry(p.time_ms).or_insert(p.value);
                if slot.is_none() {
                    *slot = p.value;
                }
            }
            lookup
        })
        .collect();

    let rows = timestamps
        .into_iter()
        .map(|time_ms| TableRow {
            time_ms,
            timestamp: format_timestamp(time_ms),
            values: lookups
                .iter()
                .map(|lookup| lookup.get(&time_ms).copied().flatten())
                .collect(),
        })
        .collect();

    MergedTable {
        columns: series.iter().map(|s| s.name.clone()).collect(),
        rows,
    }
}

// Tag domain model
use serde::{Deserialize, Serialize};

/// Column name of the fixed leading timestamp column.
pub const TIMESTAMP_COLUMN: &str = "Timestamp";

/// Placeholder shown for an empty group key.
pub const EMPTY_GROUP_LABEL: &str = "(none)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    #[serde(rename = "Tag", alias = "tag")]
    pub tag: String,
    #[serde(rename = "Unit", default)]
    pub unit: Option<String>,
    #[serde(rename = "RegisterDataType", default)]
    pub register_data_type: Option<String>,
}

impl TagRecord {
    #[cfg(test)]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            unit: None,
            register_data_type: None,
        }
    }

    /// Case-insensitive substring match used by the tag filter box
    pub fn matches_filter(&self, filter: &str) -> bool {
        self.tag.to_lowercase().contains(&filter.to_lowercase())
    }
}

/// Split a column name into (group level 1, group level 2, leaf).
///
/// The leaf always lands in the last slot: `"Tank1.Level"` becomes
/// `["Tank1", "", "Level"]` and a single segment becomes `["", "", tag]`.
pub fn header_levels(column: &str) -> [String; 3] {
    let parts: Vec<&str> = column.split('.').collect();
    match parts.as_slice() {
        [leaf] => [String::new(), String::new(), leaf.to_string()],
        [g1, leaf] => [g1.to_string(), String::new(), leaf.to_string()],
        [g1, g2, rest @ ..] => [g1.to_string(), g2.to_string(), rest.join(".")],
        [] => [String::new(), String::new(), String::new()],
    }
}

// Tag grouping: flat list, one level or two levels split on '.'
use super::tag::EMPTY_GROUP_LABEL;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            SortOrder::Asc => a.cmp(b),
            SortOrder::Desc => b.cmp(a),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupingDepth {
    Flat,
    OneLevel,
    #[default]
    TwoLevel,
}

impl GroupingDepth {
    pub fn as_u8(self) -> u8 {
        match self {
            GroupingDepth::Flat => 0,
            GroupingDepth::OneLevel => 1,
            GroupingDepth::TwoLevel => 2,
        }
    }
}

impl TryFrom<u8> for GroupingDepth {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GroupingDepth::Flat),
            1 => Ok(GroupingDepth::OneLevel),
            2 => Ok(GroupingDepth::TwoLevel),
            other => Err(format!("unsupported grouping depth {}", other)),
        }
    }
}

impl FromStr for GroupingDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let depth: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid grouping depth '{}'", s))?;
        GroupingDepth::try_from(depth)
    }
}

impl fmt::Display for GroupingDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

// Settings files store the mode as "2"; older clients send a bare number.
impl Serialize for GroupingDepth {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for GroupingDepth {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u8),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => GroupingDepth::try_from(n).map_err(serde::de::Error::custom),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// A selectable tag: the full tag is the selection key, the label is what the tree shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeafEntry {
    pub tag: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupChildren {
    Leaves(Vec<LeafEntry>),
    Groups(Vec<TagGroup>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagGroup {
    pub key: String,
    /// Level-1 key, or `"level1|level2"` for nested groups
    pub path: String,
    pub children: GroupChildren,
}

impl TagGroup {
    pub fn label(&self) -> &str {
        if self.key.is_empty() {
            EMPTY_GROUP_LABEL
        } else {
            &self.key
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagTree {
    Flat(Vec<LeafEntry>),
    Grouped(Vec<TagGroup>),
}

impl TagTree {
    /// Full tags in display order
    #[cfg(test)]
    pub fn tags(&self) -> Vec<&str> {
        fn collect<'a>(groups: &'a [TagGroup], out: &mut Vec<&'a str>) {
            for group in groups {
                match &group.children {
                    GroupChildren::Leaves(leaves) => out.extend(leaves.iter().map(|l| l.tag.as_str())),
                    GroupChildren::Groups(nested) => collect(nested, out),
                }
            }
        }

        match self {
            TagTree::Flat(leaves) => leaves.iter().map(|l| l.tag.as_str()).collect(),
            TagTree::Grouped(groups) => {
                let mut out = Vec::new();
                collect(groups, &mut out);
                out
            }
        }
    }
}

pub fn group_tags<S: AsRef<str>>(tags: &[S], depth: GroupingDepth, order: SortOrder) -> TagTree {
    match depth {
        GroupingDepth::Flat => {
            let mut leaves: Vec<LeafEntry> = tags
                .iter()
                .map(|t| LeafEntry {
                    tag: t.as_ref().to_string(),
                    label: t.as_ref().to_string(),
                })
                .collect();
            leaves.sort_by(|a, b| order.compare(&a.tag, &b.tag));
            TagTree::Flat(leaves)
        }
        GroupingDepth::OneLevel => {
            let mut groups: Buckets<Vec<LeafEntry>> = Buckets::default();
            for tag in tags {
                let (key, label) = one_level_split(tag.as_ref());
                groups.push(key, LeafEntry {
                    tag: tag.as_ref().to_string(),
                    label,
                });
            }
            TagTree::Grouped(
                groups
                    .into_sorted(order)
                    .into_iter()
                    .map(|(key, leaves)| TagGroup {
                        path: key.clone(),
                        key,
                        children: GroupChildren::Leaves(sorted_leaves(leaves, order)),
                    })
                    .collect(),
            )
        }
        GroupingDepth::TwoLevel => {
            let mut outer: Buckets<Buckets<Vec<LeafEntry>>> = Buckets::default();
            for tag in tags {
                let (g1, g2, label) = two_level_split(tag.as_ref());
                outer.entry(g1).push(g2, LeafEntry {
                    tag: tag.as_ref().to_string(),
                    label,
                });
            }
            TagTree::Grouped(
                outer
                    .into_sorted(order)
                    .into_iter()
                    .map(|(g1, inner)| {
                        let nested = inner
                            .into_sorted(order)
                            .into_iter()
                            .map(|(g2, leaves)| TagGroup {
                                path: format!("{}|{}", g1, g2),
                                key: g2,
                                children: GroupChildren::Leaves(sorted_leaves(leaves, order)),
                            })
                            .collect();
                        TagGroup {
                            path: g1.clone(),
                            key: g1,
                            children: GroupChildren::Groups(nested),
                        }
                    })
                    .collect(),
            )
        }
    }
}

/// (group key, display label) for one-level grouping
pub fn one_level_split(tag: &str) -> (String, String) {
    let parts: Vec<&str> = tag.split('.').collect();
    let key = non_empty_or(parts[0], tag);
    let label = non_empty_or(&parts[1..].join("."), tag);
    (key, label)
}

/// (level-1 key, level-2 key, display label) for two-level grouping
pub fn two_level_split(tag: &str) -> (String, String, String) {
    let parts: Vec<&str> = tag.split('.').collect();
    let g1 = parts[0].to_string();
    let g2 = parts.get(1).copied().unwrap_or("").to_string();
    let rest = parts.get(2..).map(|p| p.join(".")).unwrap_or_default();
    let label = if !rest.is_empty() {
        rest
    } else {
        non_empty_or(&g2, tag)
    };
    (g1, g2, label)
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn sorted_leaves(mut leaves: Vec<LeafEntry>, order: SortOrder) -> Vec<LeafEntry> {
    leaves.sort_by(|a, b| order.compare(&a.label, &b.label));
    leaves
}

/// Keyed buckets kept in first-arrival order until sorted.
#[derive(Debug)]
struct Buckets<T> {
    index: HashMap<String, usize>,
    entries: Vec<(String, T)>,
}

impl<T> Default for Buckets<T> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

impl<T: Default> Buckets<T> {
    fn entry(&mut self, key: String) -> &mut T {
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, T::default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }
}

impl<T> Buckets<T> {
    fn into_sorted(self, order: SortOrder) -> Vec<(String, T)> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| order.compare(&a.0, &b.0));
        entries
    }
}

impl<L> Buckets<Vec<L>> {
    fn push(&mut self, key: String, item: L) {
        self.entry(key).push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(leaves: &GroupChildren) -> Vec<&str> {
        match leaves {
            GroupChildren::Leaves(l) => l.iter().map(|e| e.label.as_str()).collect(),
            GroupChildren::Groups(_) => panic!("expected leaves"),
        }
    }

    fn groups(tree: &TagTree) -> &[TagGroup] {
        match tree {
            TagTree::Grouped(g) => g,
            TagTree::Flat(_) => panic!("expected grouped tree"),
        }
    }

    #[test]
    fn test_flat_is_sorted_permutation() {
        let tags = ["b.x", "a.y", "c", "a.x"];
        let tree = group_tags(&tags, GroupingDepth::Flat, SortOrder::Asc);
        assert_eq!(tree.tags(), vec!["a.x", "a.y", "b.x", "c"]);

        let tree = group_tags(&tags, GroupingDepth::Flat, SortOrder::Desc);
        assert_eq!(tree.tags(), vec!["c", "b.x", "a.y", "a.x"]);

        // Sorting an already sorted list is a no-op
        let sorted: Vec<&str> = tree.tags();
        let again = group_tags(&sorted, GroupingDepth::Flat, SortOrder::Desc);
        assert_eq!(again.tags(), sorted);
    }

    #[test]
    fn test_one_level_split() {
        assert_eq!(
            one_level_split("Engine1.GenA.Power"),
            ("Engine1".to_string(), "GenA.Power".to_string())
        );
        assert_eq!(one_level_split("Level"), ("Level".to_string(), "Level".to_string()));
        assert_eq!(one_level_split(".Level"), (".Level".to_string(), "Level".to_string()));
    }

    #[test]
    fn test_two_level_split() {
        assert_eq!(
            two_level_split("Engine1.GenA.Power.L1"),
            ("Engine1".to_string(), "GenA".to_string(), "Power.L1".to_string())
        );
        assert_eq!(
            two_level_split("Tank1.Level"),
            ("Tank1".to_string(), "Level".to_string(), "Level".to_string())
        );
        assert_eq!(
            two_level_split("Level"),
            ("Level".to_string(), String::new(), "Level".to_string())
        );
        assert_eq!(
            two_level_split("A..Leaf"),
            ("A".to_string(), String::new(), "Leaf".to_string())
        );
    }

    #[test]
    fn test_one_level_groups_and_sorts_labels() {
        let tags = ["Genset1.Engine.Status", "Hybrid.PMS.Freq_Gen", "Genset1.Engine.AuxTemperature"];
        let tree = group_tags(&tags, GroupingDepth::OneLevel, SortOrder::Asc);
        let groups = groups(&tree);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "Genset1");
        assert_eq!(labels(&groups[0].children), vec!["Engine.AuxTemperature", "Engine.Status"]);
        assert_eq!(groups[1].path, "Hybrid");
    }

    #[test]
    fn test_two_level_sort_order_applies_to_every_level() {
        let tags = [
            "Hybrid.Battery.MinBatteryTemp_1",
            "Genset1.Generator.CurrentL3",
            "Hybrid.Transformer.PhaseVoltage2",
            "Hybrid.Battery.AvgBatteryTemp_1",
        ];
        let tree = group_tags(&tags, GroupingDepth::TwoLevel, SortOrder::Desc);
        let outer = groups(&tree);
        assert_eq!(outer[0].key, "Hybrid");
        assert_eq!(outer[1].key, "Genset1");

        let GroupChildren::Groups(inner) = &outer[0].children else {
            panic!("expected nested groups");
        };
        assert_eq!(inner[0].key, "Transformer");
        assert_eq!(inner[1].key, "Battery");
        assert_eq!(inner[1].path, "Hybrid|Battery");
        assert_eq!(labels(&inner[1].children), vec!["MinBatteryTemp_1", "AvgBatteryTemp_1"]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        // Both leaves land in "E|Gen" with the label "Gen"
        let tags = ["E.Gen.", "E.Gen"];
        for order in [SortOrder::Asc, SortOrder::Desc] {
            let tree = group_tags(&tags, GroupingDepth::TwoLevel, order);
            assert_eq!(tree.tags(), vec!["E.Gen.", "E.Gen"]);
        }

        let tags = ["X.a.Leaf", "Y.b.Leaf"];
        let tree = group_tags(&tags, GroupingDepth::Flat, SortOrder::Desc);
        assert_eq!(tree.tags(), vec!["Y.b.Leaf", "X.a.Leaf"]);
    }

    #[test]
    fn test_empty_level_two_key_is_a_placeholder_group() {
        let tags = ["Tank1", "Tank1..Level", "Tank1.Pump.Speed"];
        let tree = group_tags(&tags, GroupingDepth::TwoLevel, SortOrder::Asc);
        let outer = groups(&tree);
        assert_eq!(outer.len(), 1);
        let GroupChildren::Groups(inner) = &outer[0].children else {
            panic!("expected nested groups");
        };
        assert_eq!(inner[0].key, "");
        assert_eq!(inner[0].label(), "(none)");
        assert_eq!(inner[0].path, "Tank1|");
        assert_eq!(labels(&inner[0].children), vec!["Level", "Tank1"]);
        assert_eq!(inner[1].label(), "Pump");
    }

    #[test]
    fn test_grouping_depth_serde() {
        let depth: GroupingDepth = serde_json::from_str("\"1\"").unwrap();
        assert_eq!(depth, GroupingDepth::OneLevel);
        let depth: GroupingDepth = serde_json::from_str("0").unwrap();
        assert_eq!(depth, GroupingDepth::Flat);
        assert!(serde_json::from_str::<GroupingDepth>("\"3\"").is_err());
        assert_eq!(serde_json::to_string(&GroupingDepth::TwoLevel).unwrap(), "\"2\"");
    }
}

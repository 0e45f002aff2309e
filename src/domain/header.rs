// Multi-level table header: group level 1, group level 2, leaf
use super::tag::{header_levels, TIMESTAMP_COLUMN};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderCell {
    pub content: String,
    #[serde(rename = "colSpan")]
    pub col_span: usize,
}

impl HeaderCell {
    fn new(content: &str, col_span: usize) -> Self {
        Self {
            content: content.to_string(),
            col_span,
        }
    }
}

/// Three header rows over the data columns. The timestamp column is not part
/// of the rows; renderers put it in front as one cell spanning all three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultiLevelHeader {
    pub timestamp: String,
    pub groups: Vec<HeaderCell>,
    pub subgroups: Vec<HeaderCell>,
    pub leaves: Vec<HeaderCell>,
}

impl MultiLevelHeader {
    /// Expand merged cells into one string per column, leading with the
    /// timestamp column. Used by sinks that have no notion of colspan.
    pub fn to_flat_rows(&self) -> [Vec<String>; 3] {
        fn expand(cells: &[HeaderCell], lead: &str) -> Vec<String> {
            let mut row = vec![lead.to_string()];
            for cell in cells {
                row.push(cell.content.clone());
                row.extend(std::iter::repeat_n(String::new(), cell.col_span.saturating_sub(1)));
            }
            row
        }

        [
            expand(&self.groups, ""),
            expand(&self.subgroups, ""),
            expand(&self.leaves, &self.timestamp),
        ]
    }
}

pub fn project_header<S: AsRef<str>>(columns: &[S]) -> MultiLevelHeader {
    let levels: Vec<[String; 3]> = columns
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| *c != TIMESTAMP_COLUMN)
        .map(header_levels)
        .collect();

    let mut groups = Vec::new();
    let mut subgroups = Vec::new();
    let mut leaves = Vec::with_capacity(levels.len());

    let mut col = 0;
    while col < levels.len() {
        let span = run_length(&levels[col..], 0);
        groups.push(HeaderCell::new(&levels[col][0], span));

        // Level-2 runs never cross a level-1 boundary
        let mut sub = col;
        while sub < col + span {
            let sub_span = run_length(&levels[sub..col + span], 1);
            subgroups.push(HeaderCell::new(&levels[sub][1], sub_span));
            for level in &levels[sub..sub + sub_span] {
                leaves.push(HeaderCell::new(&level[2], 1));
            }
            sub += sub_span;
        }
        col += span;
    }

    MultiLevelHeader {
        timestamp: TIMESTAMP_COLUMN.to_string(),
        groups,
        subgroups,
        leaves,
    }
}

fn run_length(levels: &[[String; 3]], part: usize) -> usize {
    let first = &levels[0][part];
    levels.iter().take_while(|l| &l[part] == first).count()
}

// Serialisable view of the tag tree for the selection sidebar
use crate::domain::expansion::ExpansionState;
use crate::domain::grouping::{GroupChildren, GroupingDepth, LeafEntry, SortOrder, TagGroup, TagTree};
use crate::domain::selection::SelectionSet;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeNodeView {
    Group {
        key: String,
        label: String,
        path: String,
        expanded: bool,
        children: Vec<TreeNodeView>,
    },
    Leaf {
        tag: String,
        label: String,
        selected: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeView {
    pub grouping_mode: GroupingDepth,
    pub sort_order: SortOrder,
    pub filter: String,
    pub nodes: Vec<TreeNodeView>,
    pub selected: usize,
    pub displayed: usize,
}

impl TreeView {
    /// "selected/displayed", as shown under the tree
    pub fn summary(&self) -> String {
        format!("{}/{}", self.selected, self.displayed)
    }
}

pub fn render_nodes(tree: &TagTree, expansion: &ExpansionState, selection: &SelectionSet) -> Vec<TreeNodeView> {
    match tree {
        TagTree::Flat(leaves) => leaves.iter().map(|l| leaf_view(l, selection)).collect(),
        TagTree::Grouped(groups) => groups
            .iter()
            .map(|g| group_view(g, expansion, selection))
            .collect(),
    }
}

fn group_view(group: &TagGroup, expansion: &ExpansionState, selection: &SelectionSet) -> TreeNodeView {
    let children = match &group.children {
        GroupChildren::Leaves(leaves) => leaves.iter().map(|l| leaf_view(l, selection)).collect(),
        GroupChildren::Groups(nested) => nested
            .iter()
            .map(|g| group_view(g, expansion, selection))
            .collect(),
    };
    TreeNodeView::Group {
        key: group.key.clone(),
        label: group.label().to_string(),
        path: group.path.clone(),
        expanded: expansion.is_expanded(&group.path),
        children,
    }
}

fn leaf_view(leaf: &LeafEntry, selection: &SelectionSet) -> TreeNodeView {
    TreeNodeView::Leaf {
        tag: leaf.tag.clone(),
        label: leaf.label.clone(),
        selected: selection.contains(&leaf.tag),
    }
}

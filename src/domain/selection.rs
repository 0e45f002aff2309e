// Selected tags, keyed by full tag and kept in selection order
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    order: Vec<String>,
    members: HashSet<String>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.members.contains(tag)
    }

    /// Returns false if the tag was already selected
    pub fn insert(&mut self, tag: &str) -> bool {
        if !self.members.insert(tag.to_string()) {
            return false;
        }
        self.order.push(tag.to_string());
        true
    }

    /// Returns false if the tag was not selected
    pub fn remove(&mut self, tag: &str) -> bool {
        if !self.members.remove(tag) {
            return false;
        }
        self.order.retain(|t| t != tag);
        true
    }

    /// Returns the new membership state
    pub fn toggle(&mut self, tag: &str) -> bool {
        if self.contains(tag) {
            self.remove(tag);
            false
        } else {
            self.insert(tag);
            true
        }
    }

    pub fn extend<'a>(&mut self, tags: impl IntoIterator<Item = &'a str>) {
        for tag in tags {
            self.insert(tag);
        }
    }

    pub fn remove_all<'a>(&mut self, tags: impl IntoIterator<Item = &'a str>) {
        for tag in tags {
            self.remove(tag);
        }
    }

    /// Tags in the order they were selected
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

// Group expansion state with save/restore around an active text filter
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ExpansionState {
    states: HashMap<String, bool>,
    // Pre-filter snapshot; Some while a filter is active
    saved: Option<HashMap<String, bool>>,
}

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_filtering(&self) -> bool {
        self.saved.is_some()
    }

    /// Groups are collapsed unless toggled open; every group is open while filtering.
    pub fn is_expanded(&self, path: &str) -> bool {
        self.is_filtering() || self.states.get(path).copied().unwrap_or(false)
    }

    /// Flip a group and return its new state. While filtering the change only
    /// lives until the filter is cleared.
    pub fn toggle(&mut self, path: &str) -> bool {
        let next = !self.states.get(path).copied().unwrap_or(false);
        self.states.insert(path.to_string(), next);
        next
    }

    pub fn begin_filter(&mut self) {
        if self.saved.is_none() {
            self.saved = Some(self.states.clone());
        }
    }

    pub fn end_filter(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.states = saved;
        }
    }

    /// Route a filter text change to begin/end
    pub fn apply_filter_text(&mut self, filter: &str) {
        if filter.trim().is_empty() {
            self.end_filter();
        } else {
            self.begin_filter();
        }
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.saved = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_persists_without_filter() {
        let mut state = ExpansionState::new();
        assert!(!state.is_expanded("Engine1"));
        assert!(state.toggle("Engine1"));
        assert!(state.is_expanded("Engine1"));
        assert!(!state.toggle("Engine1"));
        assert!(!state.is_expanded("Engine1"));
    }

    #[test]
    fn test_filter_forces_expansion_and_restores_exactly() {
        let mut state = ExpansionState::new();
        state.toggle("Engine1");
        state.toggle("Tank1|Pump");
        state.toggle("Tank1|Pump");

        state.apply_filter_text("gen");
        assert!(state.is_expanded("Engine1"));
        assert!(state.is_expanded("Tank1"));
        assert!(state.is_expanded("Tank1|Pump"));

        // Clicks while filtered must not leak
        state.toggle("Engine1");
        state.toggle("Tank1");
        state.apply_filter_text("gene");

        state.apply_filter_text("");
        assert!(!state.is_filtering());
        assert!(state.is_expanded("Engine1"));
        assert!(!state.is_expanded("Tank1"));
        assert!(!state.is_expanded("Tank1|Pump"));
    }

    #[test]
    fn test_end_filter_without_begin_is_noop() {
        let mut state = ExpansionState::new();
        state.toggle("A");
        state.end_filter();
        assert!(state.is_expanded("A"));
    }
}

//! Snapshot-based undo/redo history
//!
//! Linear history only: `entries[cursor]` is always the visible document,
//! and committing after an undo drops every entry past the cursor.

use crate::document::Document;

/// Default number of snapshots kept before the oldest is dropped
pub const DEFAULT_MAX_ENTRIES: usize = 100;

#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<Document>,
    cursor: usize,
    max_entries: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(Document::default())
    }
}

impl History {
    pub fn new(initial: Document) -> Self {
        Self::with_max_entries(initial, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(initial: Document, max_entries: usize) -> Self {
        Self {
            entries: vec![initial],
            cursor: 0,
            max_entries: max_entries.max(1),
        }
    }

    /// The visible document
    pub fn current(&self) -> &Document {
        &self.entries[self.cursor]
    }

    /// Record a new state, discarding any redo branch
    pub fn commit(&mut self, next: Document) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(next);

        // Limit history size
        if self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            self.entries.drain(..excess);
        }
        self.cursor = self.entries.len() - 1;
    }

    /// Swap the visible snapshot without creating an entry. Only for state
    /// that is not versioned (job flags, editing flags).
    pub fn amend(&mut self, next: Document) {
        self.entries[self.cursor] = next;
    }

    /// Step back, returning the snapshot now visible. No-op at the start.
    pub fn undo(&mut self) -> Option<&Document> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(&self.entries[self.cursor])
    }

    /// Step forward, returning the snapshot now visible. No-op at the end.
    pub fn redo(&mut self) -> Option<&Document> {
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        Some(&self.entries[self.cursor])
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Number of stored snapshots (including the current one)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Start over from a single snapshot (used on import)
    pub fn reset(&mut self, initial: Document) {
        self.entries.clear();
        self.entries.push(initial);
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(value: &str) -> Document {
        Document::new(1, 1).update_cell(0, 0, value).unwrap()
    }

    #[test]
    fn test_initial_state() {
        let history = History::new(doc_with("a"));
        assert_eq!(history.len(), 1);
        assert_eq!(history.cursor(), 0);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_undo_redo_walks_snapshots() {
        let mut history = History::new(doc_with("a"));
        history.commit(doc_with("b"));
        history.commit(doc_with("c"));

        assert_eq!(history.undo().map(|d| d.value(0, 0).to_string()), Some("b".into()));
        assert_eq!(history.undo().map(|d| d.value(0, 0).to_string()), Some("a".into()));
        assert!(history.undo().is_none());
        assert_eq!(history.current().value(0, 0), "a");

        assert_eq!(history.redo().map(|d| d.value(0, 0).to_string()), Some("b".into()));
        assert_eq!(history.redo().map(|d| d.value(0, 0).to_string()), Some("c".into()));
        assert!(history.redo().is_none());
    }

    #[test]
    fn test_commit_after_undo_truncates_redo() {
        let mut history = History::new(doc_with("a"));
        history.commit(doc_with("b"));
        history.undo();
        history.commit(doc_with("x"));

        assert!(!history.can_redo());
        assert!(history.redo().is_none());
        assert_eq!(history.current().value(0, 0), "x");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_max_entries_drops_oldest() {
        let mut history = History::with_max_entries(doc_with("0"), 3);
        for i in 1..=5 {
            history.commit(doc_with(&i.to_string()));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.cursor(), 2);
        assert_eq!(history.current().value(0, 0), "5");
        history.undo();
        history.undo();
        assert!(history.undo().is_none());
        assert_eq!(history.current().value(0, 0), "3");
    }

    #[test]
    fn test_amend_does_not_add_entry() {
        let mut history = History::new(doc_with("a"));
        let flagged = history
            .current()
            .with_column(0, |c| c.is_processing = true)
            .unwrap();
        history.amend(flagged);
        assert_eq!(history.len(), 1);
        assert!(history.current().columns()[0].is_processing);
    }

    #[test]
    fn test_reset() {
        let mut history = History::new(doc_with("a"));
        history.commit(doc_with("b"));
        history.reset(doc_with("z"));
        assert_eq!(history.len(), 1);
        assert!(!history.can_undo());
        assert_eq!(history.current().value(0, 0), "z");
    }
}

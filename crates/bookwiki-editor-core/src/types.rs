//! Selection and edit tracking.
//!
//! Offsets are document units (see [`crate::document`]), not bytes or chars.

use std::ops::Range;

use web_time::Instant;

/// Text selection with anchor and head positions.
///
/// The anchor is where the selection started, the head is where the cursor is now.
/// They may be in any order - use `start()` and `end()` for ordered bounds.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    /// Where selection started
    pub anchor: usize,
    /// Where cursor is now
    pub head: usize,
}

impl Selection {
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    /// A cursor with nothing selected.
    pub fn collapsed(offset: usize) -> Self {
        Self {
            anchor: offset,
            head: offset,
        }
    }

    pub fn start(&self) -> usize {
        self.anchor.min(self.head)
    }

    pub fn end(&self) -> usize {
        self.anchor.max(self.head)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.head
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start() && offset < self.end()
    }

    pub fn len(&self) -> usize {
        self.end() - self.start()
    }

    pub fn is_empty(&self) -> bool {
        self.is_collapsed()
    }

    /// Ordered range.
    pub fn to_range(&self) -> Range<usize> {
        self.start()..self.end()
    }

    pub fn is_backwards(&self) -> bool {
        self.head < self.anchor
    }

    /// Both ends pulled back to `len` at most.
    pub fn clamp(self, len: usize) -> Self {
        Self {
            anchor: self.anchor.min(len),
            head: self.head.min(len),
        }
    }
}

/// The most recent document change.
///
/// Hosts use the timestamp to feed the pagination debounce.
#[derive(Clone, Debug)]
pub struct EditInfo {
    /// Unit offset where the edit happened.
    pub offset: usize,
    pub inserted: usize,
    pub deleted: usize,
    /// Whether block structure changed (page breaks, block images, external
    /// replacement).
    pub structural: bool,
    /// Document length in units after the edit.
    pub doc_len_after: usize,
    pub timestamp: Instant,
}

impl PartialEq for EditInfo {
    fn eq(&self, other: &Self) -> bool {
        // Timestamp deliberately left out.
        self.offset == other.offset
            && self.inserted == other.inserted
            && self.deleted == other.deleted
            && self.structural == other.structural
            && self.doc_len_after == other.doc_len_after
    }
}

impl EditInfo {
    /// Whether the document changed again since this edit.
    pub fn is_stale(&self, current_doc_len: usize) -> bool {
        self.doc_len_after != current_doc_len
    }

    /// Units now occupied by what the edit inserted.
    pub fn affected_range(&self) -> Range<usize> {
        self.offset..self.offset + self.inserted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_bounds() {
        let sel = Selection::new(5, 10);
        assert_eq!(sel.start(), 5);
        assert_eq!(sel.end(), 10);
        assert!(!sel.is_backwards());

        let sel = Selection::new(10, 5);
        assert_eq!(sel.start(), 5);
        assert_eq!(sel.end(), 10);
        assert!(sel.is_backwards());
        assert_eq!(sel.to_range(), 5..10);
    }

    #[test]
    fn test_selection_contains() {
        let sel = Selection::new(5, 10);
        assert!(!sel.contains(4));
        assert!(sel.contains(5));
        assert!(sel.contains(9));
        assert!(!sel.contains(10)); // end is exclusive
    }

    #[test]
    fn test_selection_clamp() {
        assert_eq!(Selection::new(3, 12).clamp(8), Selection::new(3, 8));
        assert!(Selection::collapsed(20).clamp(4).is_collapsed());
    }

    #[test]
    fn test_edit_info_stale() {
        let edit = EditInfo {
            offset: 5,
            inserted: 3,
            deleted: 0,
            structural: false,
            doc_len_after: 100,
            timestamp: Instant::now(),
        };

        assert!(!edit.is_stale(100));
        assert!(edit.is_stale(101));
        assert_eq!(edit.affected_range(), 5..8);
    }
}

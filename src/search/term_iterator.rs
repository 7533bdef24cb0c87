use crate::core::types::{DocCount, TermCount, TermPos};

#[derive(Debug, Clone, PartialEq)]
pub struct TermEntry {
    pub term: String,
    pub wdf: TermCount,          // 0 when iterating the whole dictionary
    pub termfreq: DocCount,      // 0 when unknown (a detached document)
    pub positions: Vec<TermPos>,
}

impl TermEntry {
    pub fn positionlist_count(&self) -> usize {
        self.positions.len()
    }
}

/// Forward-only cursor over terms in ascending byte order.
///
/// Entries are materialised from a snapshot when the iterator is created,
/// so later writes never show up in an iterator already handed out.
#[derive(Debug, Clone, Default)]
pub struct TermIterator {
    entries: Vec<TermEntry>,
    pos: usize,
}

impl TermIterator {
    pub(crate) fn new(entries: Vec<TermEntry>) -> Self {
        TermIterator { entries, pos: 0 }
    }

    /// Moves to the first remaining term that is `>= target`.
    /// Never moves backwards; returns the entry positioned on, if any.
    pub fn skip_to(&mut self, target: &str) -> Option<&TermEntry> {
        let rest = &self.entries[self.pos..];
        self.pos += rest.partition_point(|e| e.term.as_str() < target);
        self.entries.get(self.pos)
    }

    pub fn peek(&self) -> Option<&TermEntry> {
        self.entries.get(self.pos)
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.entries.len()
    }
}

impl Iterator for TermIterator {
    type Item = TermEntry;

    fn next(&mut self) -> Option<TermEntry> {
        let entry = self.entries.get(self.pos)?.clone();
        self.pos += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.entries.len() - self.pos;
        (n, Some(n))
    }
}

impl ExactSizeIterator for TermIterator {}

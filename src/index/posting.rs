use serde::{Serialize, Deserialize};
use crate::core::types::{DocId, TermCount, TermPos};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub term_freq: TermCount,    // wdf: term frequency in document
    pub positions: Vec<TermPos>, // Token positions for phrase queries
}

/// Posting list for a term
/// Note: Sorted by doc_id with no duplicates, so merges stay linear
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostingList {
    pub postings: Vec<Posting>,
    collection_freq: u64,
}

impl PostingList {
    pub fn new() -> Self {
        PostingList::default()
    }

    /// Inserts or overwrites the posting for `posting.doc_id`.
    pub fn add_posting(&mut self, posting: Posting) {
        self.collection_freq += posting.term_freq as u64;
        match self.postings.binary_search_by_key(&posting.doc_id, |p| p.doc_id) {
            Ok(pos) => {
                let old = std::mem::replace(&mut self.postings[pos], posting);
                self.collection_freq -= old.term_freq as u64;
            }
            Err(pos) => {
                self.postings.insert(pos, posting);
            }
        }
    }

    pub fn remove(&mut self, doc_id: DocId) -> Option<Posting> {
        let pos = self.postings.binary_search_by_key(&doc_id, |p| p.doc_id).ok()?;
        let removed = self.postings.remove(pos);
        self.collection_freq -= removed.term_freq as u64;
        Some(removed)
    }

    pub fn get(&self, doc_id: DocId) -> Option<&Posting> {
        self.postings
            .binary_search_by_key(&doc_id, |p| p.doc_id)
            .ok()
            .map(|pos| &self.postings[pos])
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn doc_freq(&self) -> u32 {
        self.postings.len() as u32
    }

    /// Sum of wdf across all documents.
    pub fn total_freq(&self) -> u64 {
        self.collection_freq
    }

    /// Index of the first posting at or after `from` whose doc id is `>= target`.
    ///
    /// Gallops forward from `from` in doubling steps, then binary searches
    /// the last step, so short skips stay cheap on long lists.
    pub fn seek(&self, from: usize, target: DocId) -> usize {
        let postings = &self.postings;
        if from >= postings.len() || postings[from].doc_id >= target {
            return from;
        }

        let mut lo = from;
        let mut step = 1;
        let mut hi = from + step;
        while hi < postings.len() && postings[hi].doc_id < target {
            lo = hi;
            step *= 2;
            hi = from + step;
        }
        let hi = hi.min(postings.len());

        // postings[lo] < target, postings[hi] >= target (or hi == len)
        lo + 1 + postings[lo + 1..hi].partition_point(|p| p.doc_id < target)
    }

    /// Doc ids present in both lists (linear merge).
    pub fn intersect(&self, other: &PostingList) -> Vec<DocId> {
        let mut result = Vec::new();
        let mut i = 0;
        let mut j = 0;

        while i < self.postings.len() && j < other.postings.len() {
            let a = self.postings[i].doc_id;
            let b = other.postings[j].doc_id;

            if a == b {
                result.push(a);
                i += 1;
                j += 1;
            } else if a < b {
                i = self.seek(i, b);
            } else {
                j = other.seek(j, a);
            }
        }

        result
    }

    /// Doc ids present in either list, ascending, no duplicates.
    pub fn union(&self, other: &PostingList) -> Vec<DocId> {
        let mut result = Vec::with_capacity(self.len() + other.len());
        let mut i = 0;
        let mut j = 0;

        while i < self.postings.len() && j < other.postings.len() {
            let a = self.postings[i].doc_id;
            let b = other.postings[j].doc_id;
            if a < b {
                result.push(a);
                i += 1;
            } else if a > b {
                result.push(b);
                j += 1;
            } else {
                result.push(a);
                i += 1;
                j += 1;
            }
        }
        result.extend(self.postings[i..].iter().map(|p| p.doc_id));
        result.extend(other.postings[j..].iter().map(|p| p.doc_id));

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[u32]) -> PostingList {
        let mut pl = PostingList::new();
        for id in ids {
            pl.add_posting(Posting { doc_id: DocId(*id), term_freq: 1, positions: vec![] });
        }
        pl
    }

    fn ids(v: Vec<DocId>) -> Vec<u32> {
        v.into_iter().map(|d| d.0).collect()
    }

    #[test]
    fn stays_sorted_and_tracks_frequencies() {
        let mut pl = list(&[5, 1, 3]);
        pl.add_posting(Posting { doc_id: DocId(3), term_freq: 4, positions: vec![1, 2] });
        assert_eq!(pl.postings.iter().map(|p| p.doc_id.0).collect::<Vec<_>>(), vec![1, 3, 5]);
        assert_eq!(pl.total_freq(), 6);
        assert_eq!(pl.remove(DocId(3)).unwrap().term_freq, 4);
        assert_eq!(pl.total_freq(), 2);
        assert!(pl.remove(DocId(3)).is_none());
    }

    #[test]
    fn seek_gallops_to_first_not_less() {
        let pl = list(&(1..=100).map(|i| i * 2).collect::<Vec<_>>());
        assert_eq!(pl.seek(0, DocId(1)), 0);
        assert_eq!(pl.seek(0, DocId(2)), 0);
        assert_eq!(pl.seek(0, DocId(3)), 1);
        assert_eq!(pl.seek(10, DocId(150)), 74);
        assert_eq!(pl.seek(0, DocId(200)), 99);
        assert_eq!(pl.seek(0, DocId(201)), 100);
        assert_eq!(pl.seek(50, DocId(4)), 50);
    }

    #[test]
    fn merges() {
        let a = list(&[1, 3, 5, 7, 9]);
        let b = list(&[3, 4, 9, 10]);
        assert_eq!(ids(a.intersect(&b)), vec![3, 9]);
        assert_eq!(ids(a.union(&b)), vec![1, 3, 4, 5, 7, 9, 10]);
        assert!(a.intersect(&PostingList::new()).is_empty());
    }
}

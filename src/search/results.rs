use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;
use crate::analysis::stem::Stem;
use crate::analysis::token::Token;
use crate::analysis::tokenizer::{StandardTokenizer, Tokenizer};
use crate::core::document::Document;
use crate::core::error::Result;
use crate::core::types::{DocCount, DocId, ValueSlot};
use crate::index::state::IndexState;

/// Tie-break between documents of equal rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocidOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Relevance,
    /// By the value in `slot`; ascending unless `reverse`.
    Value { slot: ValueSlot, reverse: bool },
    /// By value, then by relevance among equal values.
    ValueThenRelevance { slot: ValueSlot, reverse: bool },
}

impl SortOrder {
    pub fn slot(&self) -> Option<ValueSlot> {
        match self {
            SortOrder::Relevance => None,
            SortOrder::Value { slot, .. } | SortOrder::ValueThenRelevance { slot, .. } => Some(*slot),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RankOrder {
    pub sort: SortOrder,
    pub docid_order: DocidOrder,
}

impl RankOrder {
    /// `Less` means `a` ranks ahead of `b`.
    pub fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering {
        let by_weight = || b.weight.total_cmp(&a.weight);
        let by_value = |reverse: bool| {
            let order = a.sort_key.cmp(&b.sort_key);
            if reverse { order.reverse() } else { order }
        };
        let by_docid = match self.docid_order {
            DocidOrder::Ascending => a.docid.cmp(&b.docid),
            DocidOrder::Descending => b.docid.cmp(&a.docid),
        };

        match self.sort {
            SortOrder::Relevance => by_weight().then(by_docid),
            SortOrder::Value { reverse, .. } => by_value(reverse).then(by_docid),
            SortOrder::ValueThenRelevance { reverse, .. } => {
                by_value(reverse).then_with(by_weight).then(by_docid)
            }
        }
    }
}

/// A matching document on its way into the result window.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub docid: DocId,
    pub weight: f64,
    pub sort_key: Option<String>,
    pub collapse_key: Option<String>,
    pub collapse_count: DocCount,
    pub order: RankOrder,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Greater = ranks worse, so the max-heap keeps the weakest candidate on top.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order.compare(self, other)
    }
}

/// Top-K collector for efficient result collection
pub struct TopKCollector {
    pub heap: BinaryHeap<Candidate>,
    pub k: usize,
    pub total_collected: usize,
}

impl TopKCollector {
    pub fn new(k: usize) -> Self {
        TopKCollector {
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(4096)),
            k,
            total_collected: 0,
        }
    }

    pub fn collect(&mut self, candidate: Candidate) {
        self.total_collected += 1;
        if self.k == 0 {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if self.heap.peek().is_some_and(|worst| candidate < *worst) {
            self.heap.pop();
            self.heap.push(candidate);
        }
    }

    /// Best first.
    pub fn into_sorted(self) -> Vec<Candidate> {
        self.heap.into_sorted_vec()
    }
}

/// One entry of an `MSet`.
#[derive(Debug, Clone, PartialEq)]
pub struct MSetItem {
    pub docid: DocId,
    pub weight: f64,
    pub rank: usize,
    pub percent: u32,
    pub collapse_key: Option<String>,
    pub collapse_count: DocCount,
    pub sort_key: Option<String>,
}

/// Matches returned by `Enquire::get_mset`, with match statistics.
#[derive(Debug, Clone)]
pub struct MSet {
    pub(crate) items: Vec<MSetItem>,
    pub(crate) firstitem: usize,
    pub(crate) matches_lower_bound: DocCount,
    pub(crate) matches_estimated: DocCount,
    pub(crate) matches_upper_bound: DocCount,
    pub(crate) max_possible: f64,
    pub(crate) max_attained: f64,
    pub(crate) terms: Vec<String>,
    pub(crate) state: Arc<IndexState>,
}

impl MSet {
    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get_firstitem(&self) -> usize {
        self.firstitem
    }

    pub fn get_matches_lower_bound(&self) -> DocCount {
        self.matches_lower_bound
    }

    pub fn get_matches_estimated(&self) -> DocCount {
        self.matches_estimated
    }

    pub fn get_matches_upper_bound(&self) -> DocCount {
        self.matches_upper_bound
    }

    pub fn get_max_possible(&self) -> f64 {
        self.max_possible
    }

    pub fn get_max_attained(&self) -> f64 {
        self.max_attained
    }

    /// Number of documents indexing `term` in the searched snapshot.
    pub fn get_termfreq(&self, term: &str) -> DocCount {
        self.state.dictionary.term_statistics(term).doc_freq
    }

    pub fn items(&self) -> &[MSetItem] {
        &self.items
    }

    pub fn docids(&self) -> Vec<DocId> {
        self.items.iter().map(|item| item.docid).collect()
    }

    pub fn get(&self, index: usize) -> Option<MSetHit> {
        self.items.get(index).map(|item| MSetHit { item: item.clone(), state: Arc::clone(&self.state) })
    }

    pub fn iter(&self) -> MSetIterator {
        MSetIterator { items: self.items.clone().into_iter(), state: Arc::clone(&self.state) }
    }

    /// Returns up to `length` bytes of `text` around the first query term,
    /// with query terms wrapped in `<b>`...`</b>`.
    pub fn snippet(&self, text: &str, length: usize, stemmer: &Stem) -> String {
        let wanted: HashSet<&str> = self.terms.iter().map(String::as_str).collect();
        let tokens = StandardTokenizer::default().tokenize(text);
        let is_hit = |token: &Token| {
            let word = token.text.to_lowercase();
            wanted.contains(word.as_str())
                || (!stemmer.is_none() && wanted.contains(format!("Z{}", stemmer.stem(&word)).as_str()))
        };
        let hits: Vec<bool> = tokens.iter().map(is_hit).collect();

        let start = if text.len() <= length {
            0
        } else {
            tokens.iter().zip(&hits).find(|(_, hit)| **hit).map_or(0, |(token, _)| token.offset)
        };
        let limit = start.saturating_add(length);

        let mut out = String::new();
        if start > 0 {
            out.push_str("...");
        }
        let mut cursor = start;
        let mut truncated = false;
        for (token, hit) in tokens.iter().zip(&hits).filter(|(token, _)| token.offset >= start) {
            let end = token.offset + token.length;
            if end > limit {
                truncated = true;
                // A first word longer than `length` is clipped instead of dropped
                if cursor == start {
                    let clip = char_floor(text, limit.min(end), token.offset);
                    if clip > token.offset {
                        push_word(&mut out, &text[token.offset..clip], *hit);
                    }
                }
                break;
            }
            out.push_str(&text[cursor..token.offset]);
            push_word(&mut out, &text[token.offset..end], *hit);
            cursor = end;
        }
        if !truncated {
            out.push_str(&text[cursor..]);
        } else if !out.ends_with("...") {
            out.push_str("...");
        }
        out
    }
}

fn push_word(out: &mut String, word: &str, hit: bool) {
    if hit {
        out.push_str("<b>");
        out.push_str(word);
        out.push_str("</b>");
    } else {
        out.push_str(word);
    }
}

/// Largest char boundary in `text` that is at most `index` and not below `floor`.
fn char_floor(text: &str, index: usize, floor: usize) -> usize {
    let mut index = index.min(text.len());
    while index > floor && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

impl<'a> IntoIterator for &'a MSet {
    type Item = MSetHit;
    type IntoIter = MSetIterator;

    fn into_iter(self) -> MSetIterator {
        self.iter()
    }
}

/// A hit read through an `MSetIterator`; its document comes from the
/// snapshot the match ran against.
#[derive(Debug, Clone)]
pub struct MSetHit {
    item: MSetItem,
    state: Arc<IndexState>,
}

impl MSetHit {
    pub fn docid(&self) -> DocId {
        self.item.docid
    }

    pub fn weight(&self) -> f64 {
        self.item.weight
    }

    pub fn rank(&self) -> usize {
        self.item.rank
    }

    pub fn percent(&self) -> u32 {
        self.item.percent
    }

    pub fn collapse_key(&self) -> Option<&str> {
        self.item.collapse_key.as_deref()
    }

    pub fn collapse_count(&self) -> DocCount {
        self.item.collapse_count
    }

    pub fn sort_key(&self) -> Option<&str> {
        self.item.sort_key.as_deref()
    }

    pub fn document(&self) -> Result<Arc<Document>> {
        self.state.store.get(self.item.docid)
    }
}

pub struct MSetIterator {
    items: std::vec::IntoIter<MSetItem>,
    state: Arc<IndexState>,
}

impl Iterator for MSetIterator {
    type Item = MSetHit;

    fn next(&mut self) -> Option<MSetHit> {
        self.items.next().map(|item| MSetHit { item, state: Arc::clone(&self.state) })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl ExactSizeIterator for MSetIterator {}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(docid: u32, weight: f64, order: RankOrder) -> Candidate {
        Candidate { docid: DocId(docid), weight, sort_key: None, collapse_key: None, collapse_count: 0, order }
    }

    #[test]
    fn collector_keeps_best_k_with_docid_tiebreak() {
        let order = RankOrder::default();
        let mut collector = TopKCollector::new(3);
        for (docid, weight) in [(1, 0.5), (2, 2.0), (3, 0.5), (4, 1.0), (5, 0.1)] {
            collector.collect(candidate(docid, weight, order));
        }
        let ids: Vec<u32> = collector.into_sorted().iter().map(|c| c.docid.0).collect();
        assert_eq!(ids, vec![2, 4, 1]);
    }

    #[test]
    fn descending_docid_order_flips_ties() {
        let order = RankOrder { docid_order: DocidOrder::Descending, ..RankOrder::default() };
        let mut collector = TopKCollector::new(2);
        for docid in 1..=4 {
            collector.collect(candidate(docid, 1.0, order));
        }
        let ids: Vec<u32> = collector.into_sorted().iter().map(|c| c.docid.0).collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[test]
    fn value_sort_ignores_weight() {
        let order = RankOrder { sort: SortOrder::Value { slot: 0, reverse: true }, ..RankOrder::default() };
        let mut a = candidate(1, 9.0, order);
        a.sort_key = Some("apple".into());
        let mut b = candidate(2, 1.0, order);
        b.sort_key = Some("pear".into());
        assert_eq!(a.cmp(&b), Ordering::Greater);
    }

    #[test]
    fn zero_k_collects_nothing() {
        let mut collector = TopKCollector::new(0);
        collector.collect(candidate(1, 1.0, RankOrder::default()));
        assert_eq!(collector.total_collected, 1);
        assert!(collector.into_sorted().is_empty());
    }

    #[test]
    fn snippet_highlights_terms() {
        let mset = MSet {
            items: Vec::new(),
            firstitem: 0,
            matches_lower_bound: 0,
            matches_estimated: 0,
            matches_upper_bound: 0,
            max_possible: 0.0,
            max_attained: 0.0,
            terms: vec!["fox".into(), "Zjump".into()],
            state: Arc::new(IndexState::new()),
        };
        let english = Stem::new("english").unwrap();
        assert_eq!(
            mset.snippet("The Fox jumped.", 100, &english),
            "The <b>Fox</b> <b>jumped</b>."
        );
        assert_eq!(mset.snippet("a b c d fox e f g", 5, &Stem::none()), "...<b>fox</b> e...");
    }

    #[test]
    fn snippet_clips_an_overlong_first_hit_once() {
        let mset = MSet {
            items: Vec::new(),
            firstitem: 0,
            matches_lower_bound: 0,
            matches_estimated: 0,
            matches_upper_bound: 0,
            max_possible: 0.0,
            max_attained: 0.0,
            terms: vec!["foxhound".into()],
            state: Arc::new(IndexState::new()),
        };
        let none = Stem::none();
        assert_eq!(mset.snippet("a b c foxhound d", 3, &none), "...<b>fox</b>...");
        assert_eq!(mset.snippet("a b c foxhound d", 0, &none), "...");
        assert_eq!(mset.snippet("foxhound runs far", 3, &none), "<b>fox</b>...");
    }
}

use crate::core::types::{DocId, TermPos};
use crate::index::doc_store::DocumentStore;
use crate::index::posting::{Posting, PostingList};
use crate::scoring::scorer::{CollectionStats, Scorer, TermWeightStats};

/// Forward-only cursor over the documents matching part of a query,
/// in ascending docid order.
pub trait PostList {
    /// Current document; `None` before the first move and after the end.
    fn docid(&self) -> Option<DocId>;

    /// Moves to the next match.
    fn advance(&mut self) -> Option<DocId>;

    /// Moves to the first match `>= target`. Never moves backwards.
    fn skip_to(&mut self, target: DocId) -> Option<DocId>;

    /// Weight of the current document.
    fn weight(&self) -> f64;

    /// Upper bound of `weight` over all documents.
    fn max_weight(&self) -> f64;

    /// Upper bound on the number of matches.
    fn estimate(&self) -> u64;
}

impl<P: PostList + ?Sized> PostList for Box<P> {
    fn docid(&self) -> Option<DocId> {
        (**self).docid()
    }

    fn advance(&mut self) -> Option<DocId> {
        (**self).advance()
    }

    fn skip_to(&mut self, target: DocId) -> Option<DocId> {
        (**self).skip_to(target)
    }

    fn weight(&self) -> f64 {
        (**self).weight()
    }

    fn max_weight(&self) -> f64 {
        (**self).max_weight()
    }

    fn estimate(&self) -> u64 {
        (**self).estimate()
    }
}

pub type BoxedPostList<'p> = Box<dyn PostList + 'p>;

/// Positions every list on the first document `>= target` they all share.
fn align<P: PostList>(lists: &mut [P], mut target: DocId) -> Option<DocId> {
    'retry: loop {
        for list in lists.iter_mut() {
            let docid = list.skip_to(target)?;
            if docid > target {
                target = docid;
                continue 'retry;
            }
        }
        return Some(target);
    }
}

pub struct EmptyPostList;

impl PostList for EmptyPostList {
    fn docid(&self) -> Option<DocId> {
        None
    }

    fn advance(&mut self) -> Option<DocId> {
        None
    }

    fn skip_to(&mut self, _target: DocId) -> Option<DocId> {
        None
    }

    fn weight(&self) -> f64 {
        0.0
    }

    fn max_weight(&self) -> f64 {
        0.0
    }

    fn estimate(&self) -> u64 {
        0
    }
}

/// One term's postings, weighted by the scorer.
pub struct TermPostList<'p> {
    list: &'p PostingList,
    idx: usize,
    started: bool,
    stats: TermWeightStats,
    scorer: &'p dyn Scorer,
    collection: CollectionStats,
    store: &'p DocumentStore,
}

impl<'p> TermPostList<'p> {
    pub fn new(
        list: &'p PostingList,
        stats: TermWeightStats,
        scorer: &'p dyn Scorer,
        collection: CollectionStats,
        store: &'p DocumentStore,
    ) -> Self {
        TermPostList { list, idx: 0, started: false, stats, scorer, collection, store }
    }

    fn posting(&self) -> Option<&'p Posting> {
        if self.started {
            self.list.postings.get(self.idx)
        } else {
            None
        }
    }

    /// Positions of the term in the current document.
    pub fn positions(&self) -> &'p [TermPos] {
        self.posting().map(|p| p.positions.as_slice()).unwrap_or(&[])
    }
}

impl PostList for TermPostList<'_> {
    fn docid(&self) -> Option<DocId> {
        self.posting().map(|p| p.doc_id)
    }

    fn advance(&mut self) -> Option<DocId> {
        if self.started {
            self.idx = (self.idx + 1).min(self.list.len());
        } else {
            self.started = true;
        }
        self.docid()
    }

    fn skip_to(&mut self, target: DocId) -> Option<DocId> {
        let from = if self.started { self.idx } else { 0 };
        self.started = true;
        self.idx = self.list.seek(from, target);
        self.docid()
    }

    fn weight(&self) -> f64 {
        self.posting().map_or(0.0, |p| {
            let doc_length = self.store.doc_length(p.doc_id).unwrap_or(0);
            self.scorer.score(p.term_freq, doc_length, &self.stats, &self.collection)
        })
    }

    fn max_weight(&self) -> f64 {
        self.scorer.max_score(&self.stats, &self.collection)
    }

    fn estimate(&self) -> u64 {
        self.list.len() as u64
    }
}

/// Fixed docid list with no weight: every live document, or a value range.
pub struct DocListPostList<'p> {
    ids: &'p [DocId],
    idx: usize,
    started: bool,
}

impl<'p> DocListPostList<'p> {
    pub fn new(ids: &'p [DocId]) -> Self {
        DocListPostList { ids, idx: 0, started: false }
    }
}

impl PostList for DocListPostList<'_> {
    fn docid(&self) -> Option<DocId> {
        if self.started { self.ids.get(self.idx).copied() } else { None }
    }

    fn advance(&mut self) -> Option<DocId> {
        if self.started {
            self.idx = (self.idx + 1).min(self.ids.len());
        } else {
            self.started = true;
        }
        self.docid()
    }

    fn skip_to(&mut self, target: DocId) -> Option<DocId> {
        let from = if self.started { self.idx } else { 0 };
        self.started = true;
        self.idx = from + self.ids[from..].partition_point(|id| *id < target);
        self.docid()
    }

    fn weight(&self) -> f64 {
        0.0
    }

    fn max_weight(&self) -> f64 {
        0.0
    }

    fn estimate(&self) -> u64 {
        self.ids.len() as u64
    }
}

/// Documents matching every child. Only the first `weighted` children
/// contribute weight, which is how FILTER is expressed.
pub struct AndPostList<'p> {
    children: Vec<BoxedPostList<'p>>,
    weighted: usize,
    current: Option<DocId>,
    started: bool,
}

impl<'p> AndPostList<'p> {
    pub fn new(children: Vec<BoxedPostList<'p>>) -> Self {
        let weighted = children.len();
        AndPostList { children, weighted, current: None, started: false }
    }

    pub fn filter(query: BoxedPostList<'p>, filter: BoxedPostList<'p>) -> Self {
        AndPostList { children: vec![query, filter], weighted: 1, current: None, started: false }
    }
}

impl PostList for AndPostList<'_> {
    fn docid(&self) -> Option<DocId> {
        self.current
    }

    fn advance(&mut self) -> Option<DocId> {
        if self.started && self.current.is_none() {
            return None;
        }
        self.started = true;
        self.current = match self.children.first_mut().and_then(|lead| lead.advance()) {
            Some(first) => align(&mut self.children, first),
            None => None,
        };
        self.current
    }

    fn skip_to(&mut self, target: DocId) -> Option<DocId> {
        if self.started && self.current.is_none_or(|c| c >= target) {
            return self.current;
        }
        self.started = true;
        self.current = align(&mut self.children, target);
        self.current
    }

    fn weight(&self) -> f64 {
        self.children[..self.weighted].iter().map(|c| c.weight()).sum()
    }

    fn max_weight(&self) -> f64 {
        self.children[..self.weighted].iter().map(|c| c.max_weight()).sum()
    }

    fn estimate(&self) -> u64 {
        self.children.iter().map(|c| c.estimate()).min().unwrap_or(0)
    }
}

/// Documents matching any child; weights of the children present are summed.
pub struct OrPostList<'p> {
    children: Vec<BoxedPostList<'p>>,
    current: Option<DocId>,
    started: bool,
}

impl<'p> OrPostList<'p> {
    pub fn new(children: Vec<BoxedPostList<'p>>) -> Self {
        OrPostList { children, current: None, started: false }
    }

    fn settle(&mut self) -> Option<DocId> {
        self.current = self.children.iter().filter_map(|c| c.docid()).min();
        self.current
    }

    fn present(&self) -> impl Iterator<Item = &BoxedPostList<'p>> {
        let current = self.current;
        self.children.iter().filter(move |c| current.is_some() && c.docid() == current)
    }
}

impl PostList for OrPostList<'_> {
    fn docid(&self) -> Option<DocId> {
        self.current
    }

    fn advance(&mut self) -> Option<DocId> {
        if !self.started {
            self.started = true;
            for child in &mut self.children {
                child.advance();
            }
        } else {
            let current = self.current?;
            for child in &mut self.children {
                if child.docid() == Some(current) {
                    child.advance();
                }
            }
        }
        self.settle()
    }

    fn skip_to(&mut self, target: DocId) -> Option<DocId> {
        if self.started && self.current.is_none_or(|c| c >= target) {
            return self.current;
        }
        self.started = true;
        for child in &mut self.children {
            if child.docid().is_none_or(|d| d < target) {
                child.skip_to(target);
            }
        }
        self.settle()
    }

    fn weight(&self) -> f64 {
        self.present().map(|c| c.weight()).sum()
    }

    fn max_weight(&self) -> f64 {
        self.children.iter().map(|c| c.max_weight()).sum()
    }

    fn estimate(&self) -> u64 {
        self.children.iter().map(|c| c.estimate()).sum()
    }
}

/// Documents matched by an odd number of children.
pub struct XorPostList<'p> {
    inner: OrPostList<'p>,
}

impl<'p> XorPostList<'p> {
    pub fn new(children: Vec<BoxedPostList<'p>>) -> Self {
        XorPostList { inner: OrPostList::new(children) }
    }

    fn odd(&self) -> bool {
        self.inner.present().count() % 2 == 1
    }

    fn settle(&mut self, mut found: Option<DocId>) -> Option<DocId> {
        while found.is_some() && !self.odd() {
            found = self.inner.advance();
        }
        found
    }
}

impl PostList for XorPostList<'_> {
    fn docid(&self) -> Option<DocId> {
        self.inner.docid()
    }

    fn advance(&mut self) -> Option<DocId> {
        let found = self.inner.advance();
        self.settle(found)
    }

    fn skip_to(&mut self, target: DocId) -> Option<DocId> {
        let found = self.inner.skip_to(target);
        self.settle(found)
    }

    fn weight(&self) -> f64 {
        self.inner.weight()
    }

    fn max_weight(&self) -> f64 {
        self.inner.max_weight()
    }

    fn estimate(&self) -> u64 {
        self.inner.estimate()
    }
}

/// Left minus anything the right also matches.
pub struct AndNotPostList<'p> {
    left: BoxedPostList<'p>,
    right: BoxedPostList<'p>,
}

impl<'p> AndNotPostList<'p> {
    pub fn new(left: BoxedPostList<'p>, right: BoxedPostList<'p>) -> Self {
        AndNotPostList { left, right }
    }

    fn settle(&mut self, mut found: Option<DocId>) -> Option<DocId> {
        while let Some(docid) = found {
            if self.right.skip_to(docid) != Some(docid) {
                return Some(docid);
            }
            found = self.left.advance();
        }
        None
    }
}

impl PostList for AndNotPostList<'_> {
    fn docid(&self) -> Option<DocId> {
        self.left.docid()
    }

    fn advance(&mut self) -> Option<DocId> {
        let found = self.left.advance();
        self.settle(found)
    }

    fn skip_to(&mut self, target: DocId) -> Option<DocId> {
        let found = self.left.skip_to(target);
        self.settle(found)
    }

    fn weight(&self) -> f64 {
        self.left.weight()
    }

    fn max_weight(&self) -> f64 {
        self.left.max_weight()
    }

    fn estimate(&self) -> u64 {
        self.left.estimate()
    }
}

/// Left's matches; the right only adds weight where it also matches.
pub struct AndMaybePostList<'p> {
    left: BoxedPostList<'p>,
    right: BoxedPostList<'p>,
}

impl<'p> AndMaybePostList<'p> {
    pub fn new(left: BoxedPostList<'p>, right: BoxedPostList<'p>) -> Self {
        AndMaybePostList { left, right }
    }

    fn sync_right(&mut self, found: Option<DocId>) -> Option<DocId> {
        if let Some(docid) = found {
            self.right.skip_to(docid);
        }
        found
    }
}

impl PostList for AndMaybePostList<'_> {
    fn docid(&self) -> Option<DocId> {
        self.left.docid()
    }

    fn advance(&mut self) -> Option<DocId> {
        let found = self.left.advance();
        self.sync_right(found)
    }

    fn skip_to(&mut self, target: DocId) -> Option<DocId> {
        let found = self.left.skip_to(target);
        self.sync_right(found)
    }

    fn weight(&self) -> f64 {
        let mut weight = self.left.weight();
        if self.left.docid().is_some() && self.right.docid() == self.left.docid() {
            weight += self.right.weight();
        }
        weight
    }

    fn max_weight(&self) -> f64 {
        self.left.max_weight() + self.right.max_weight()
    }

    fn estimate(&self) -> u64 {
        self.left.estimate()
    }
}

pub struct ScalePostList<'p> {
    inner: BoxedPostList<'p>,
    factor: f64,
}

impl<'p> ScalePostList<'p> {
    pub fn new(inner: BoxedPostList<'p>, factor: f64) -> Self {
        ScalePostList { inner, factor }
    }
}

impl PostList for ScalePostList<'_> {
    fn docid(&self) -> Option<DocId> {
        self.inner.docid()
    }

    fn advance(&mut self) -> Option<DocId> {
        self.inner.advance()
    }

    fn skip_to(&mut self, target: DocId) -> Option<DocId> {
        self.inner.skip_to(target)
    }

    fn weight(&self) -> f64 {
        self.inner.weight() * self.factor
    }

    fn max_weight(&self) -> f64 {
        self.inner.max_weight() * self.factor
    }

    fn estimate(&self) -> u64 {
        self.inner.estimate()
    }
}

/// Documents containing every term with positions inside a window,
/// in query order for phrases or any order for NEAR.
pub struct PositionalPostList<'p> {
    terms: Vec<TermPostList<'p>>,
    window: u32,
    ordered: bool,
    current: Option<DocId>,
    started: bool,
}

impl<'p> PositionalPostList<'p> {
    pub fn new(terms: Vec<TermPostList<'p>>, window: u32, ordered: bool) -> Self {
        PositionalPostList { terms, window, ordered, current: None, started: false }
    }

    fn find_from(&mut self, mut target: DocId) -> Option<DocId> {
        loop {
            let docid = align(&mut self.terms, target)?;
            if self.positions_match() {
                return Some(docid);
            }
            target = self.terms[0].advance()?;
        }
    }

    fn positions_match(&self) -> bool {
        let lists: Vec<&[TermPos]> = self.terms.iter().map(|t| t.positions()).collect();
        if lists.iter().any(|l| l.is_empty()) {
            return false;
        }
        if self.ordered {
            ordered_within(&lists, self.window)
        } else {
            unordered_within(&lists, self.window)
        }
    }
}

impl PostList for PositionalPostList<'_> {
    fn docid(&self) -> Option<DocId> {
        self.current
    }

    fn advance(&mut self) -> Option<DocId> {
        if self.started && self.current.is_none() {
            return None;
        }
        self.started = true;
        self.current = match self.terms.first_mut().and_then(|lead| lead.advance()) {
            Some(first) => self.find_from(first),
            None => None,
        };
        self.current
    }

    fn skip_to(&mut self, target: DocId) -> Option<DocId> {
        if self.started && self.current.is_none_or(|c| c >= target) {
            return self.current;
        }
        self.started = true;
        self.current = self.find_from(target);
        self.current
    }

    fn weight(&self) -> f64 {
        self.terms.iter().map(|t| t.weight()).sum()
    }

    fn max_weight(&self) -> f64 {
        self.terms.iter().map(|t| t.max_weight()).sum()
    }

    fn estimate(&self) -> u64 {
        self.terms.iter().map(|t| t.estimate()).min().unwrap_or(0)
    }
}

/// Each list in turn has a position after the previous one's, and the
/// whole run spans at most `window` positions.
fn ordered_within(lists: &[&[TermPos]], window: u32) -> bool {
    for &first in lists[0] {
        let mut prev = first;
        for list in &lists[1..] {
            let idx = list.partition_point(|p| *p <= prev);
            match list.get(idx) {
                Some(&next) => prev = next,
                // No later start can do better
                None => return false,
            }
        }
        if prev - first < window {
            return true;
        }
    }
    false
}

/// Smallest span holding one position from every list, compared to `window`.
/// A repeated term shares one list and needs a distinct position per use.
fn unordered_within(lists: &[&[TermPos]], window: u32) -> bool {
    let mut groups: Vec<(&[TermPos], usize)> = Vec::with_capacity(lists.len());
    for list in lists {
        match groups.iter_mut().find(|(seen, _)| std::ptr::eq(*seen, *list)) {
            Some((_, needed)) => *needed += 1,
            None => groups.push((list, 1)),
        }
    }

    let mut events: Vec<(TermPos, usize)> = groups
        .iter()
        .enumerate()
        .flat_map(|(g, (list, _))| list.iter().map(move |p| (*p, g)))
        .collect();
    events.sort_unstable();

    let mut counts = vec![0usize; groups.len()];
    let mut covered = 0;
    let mut lo = 0;
    for hi in 0..events.len() {
        let (_, g) = events[hi];
        counts[g] += 1;
        if counts[g] == groups[g].1 {
            covered += 1;
        }

        while covered == groups.len() {
            if events[hi].0 - events[lo].0 < window {
                return true;
            }
            let (_, j) = events[lo];
            if counts[j] == groups[j].1 {
                covered -= 1;
            }
            counts[j] -= 1;
            lo += 1;
        }
    }
    false
}

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use crate::core::types::{DocCount, DocId, TermCount, TermPos};
use crate::index::posting::{Posting, PostingList};

/// Term statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermStats {
    pub doc_freq: DocCount,      // Number of documents containing term
    pub collection_freq: u64,    // Total occurrences across all documents
}

/// Ordered term dictionary.
///
/// Posting lists sit behind `Arc` so a cloned dictionary shares them with
/// published snapshots; `insert`/`remove` copy a list only when it is shared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TermDictionary {
    terms: BTreeMap<String, Arc<PostingList>>,
}

impl TermDictionary {
    pub fn new() -> Self {
        TermDictionary::default()
    }

    pub fn lookup(&self, term: &str) -> Option<&PostingList> {
        self.terms.get(term).map(Arc::as_ref)
    }

    pub fn shared(&self, term: &str) -> Option<Arc<PostingList>> {
        self.terms.get(term).cloned()
    }

    pub fn insert(&mut self, term: &str, doc_id: DocId, wdf: TermCount, positions: Vec<TermPos>) {
        let list = match self.terms.get_mut(term) {
            Some(list) => list,
            None => self.terms.entry(term.to_string()).or_default(),
        };
        Arc::make_mut(list).add_posting(Posting { doc_id, term_freq: wdf, positions });
    }

    /// Removes `doc_id` from the term's list, dropping the term once empty.
    pub fn remove(&mut self, term: &str, doc_id: DocId) -> Option<Posting> {
        let list = self.terms.get_mut(term)?;
        let removed = Arc::make_mut(list).remove(doc_id);
        if list.is_empty() {
            self.terms.remove(term);
        }
        removed
    }

    pub fn term_statistics(&self, term: &str) -> TermStats {
        self.lookup(term)
            .map(|list| TermStats {
                doc_freq: list.doc_freq(),
                collection_freq: list.total_freq(),
            })
            .unwrap_or_default()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains_key(term)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms starting with `prefix`, ascending.
    pub fn prefixed<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a PostingList)> + 'a {
        self.terms
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(term, _)| term.starts_with(prefix))
            .map(|(term, list)| (term.as_str(), list.as_ref()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PostingList)> {
        self.terms.iter().map(|(term, list)| (term.as_str(), list.as_ref()))
    }
}

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use levenshtein_automata::{Distance, LevenshteinAutomatonBuilder};
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::core::document::Document;
use crate::core::error::{Error, Result};
use crate::core::types::{DocCount, DocId, TermPos};
use crate::index::doc_store::DocumentStore;
use crate::index::inverted::TermDictionary;
use crate::search::term_iterator::{TermEntry, TermIterator};
use crate::writer::batch::Change;

/// Largest edit distance a spelling suggestion may have.
pub const MAX_SPELLING_EDIT: u8 = 4;

/// Complete contents of a database at one revision.
///
/// Published snapshots hold this behind an `Arc`; the writer mutates its own
/// copy through `Arc::make_mut`, which shares every untouched posting list
/// and value stream with the snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexState {
    pub uuid: Uuid,
    pub revision: u64,
    pub last_docid: u32,
    pub dictionary: TermDictionary,
    pub store: DocumentStore,
    pub metadata: BTreeMap<String, String>,
    pub spelling: BTreeMap<String, u32>,
    pub synonyms: BTreeMap<String, BTreeSet<String>>,
    positional_postings: u64,
}

impl Default for IndexState {
    fn default() -> Self {
        IndexState::new()
    }
}

impl IndexState {
    pub fn new() -> Self {
        IndexState {
            uuid: Uuid::new_v4(),
            revision: 0,
            last_docid: 0,
            dictionary: TermDictionary::new(),
            store: DocumentStore::new(),
            metadata: BTreeMap::new(),
            spelling: BTreeMap::new(),
            synonyms: BTreeMap::new(),
            positional_postings: 0,
        }
    }

    pub fn doc_count(&self) -> u64 {
        self.store.len()
    }

    pub fn total_length(&self) -> u64 {
        self.store.total_length()
    }

    pub fn avlength(&self) -> f64 {
        self.store.statistics().average_length
    }

    pub fn has_positions(&self) -> bool {
        self.positional_postings > 0
    }

    pub fn apply(&mut self, change: &Change) -> Result<()> {
        match change {
            Change::AddDocument { id, doc } | Change::ReplaceDocument { id, doc } => {
                self.replace_document(*id, doc.clone());
            }
            Change::DeleteDocument { id } => {
                self.delete_document(*id).ok_or_else(|| {
                    Error::not_found(format!("Document {} not found", id))
                })?;
            }
            Change::SetMetadata { key, value } => {
                if value.is_empty() {
                    self.metadata.remove(key);
                } else {
                    self.metadata.insert(key.clone(), value.clone());
                }
            }
            Change::AddSpelling { word, freq } => {
                *self.spelling.entry(word.clone()).or_insert(0) += freq;
            }
            Change::RemoveSpelling { word, freq } => {
                if let Some(current) = self.spelling.get_mut(word) {
                    *current = current.saturating_sub(*freq);
                    if *current == 0 {
                        self.spelling.remove(word);
                    }
                }
            }
            Change::AddSynonym { term, synonym } => {
                self.synonyms.entry(term.clone()).or_default().insert(synonym.clone());
            }
            Change::RemoveSynonym { term, synonym } => {
                if let Some(set) = self.synonyms.get_mut(term) {
                    set.remove(synonym);
                    if set.is_empty() {
                        self.synonyms.remove(term);
                    }
                }
            }
            Change::ClearSynonyms { term } => {
                self.synonyms.remove(term);
            }
        }
        Ok(())
    }

    /// Delete-then-insert under `id`. Inserting past `last_docid` advances it.
    pub fn replace_document(&mut self, id: DocId, doc: Document) {
        self.delete_document(id);

        for (term, data) in doc.terms() {
            self.positional_postings += data.positions.len() as u64;
            self.dictionary.insert(term, id, data.wdf, data.positions.clone());
        }
        self.store.put(id, doc);
        self.last_docid = self.last_docid.max(id.0);
    }

    /// Removes the document from the store and from every posting list it is on.
    pub fn delete_document(&mut self, id: DocId) -> Option<Arc<Document>> {
        let doc = self.store.delete(id)?;
        for (term, data) in doc.terms() {
            self.positional_postings -= data.positions.len() as u64;
            self.dictionary.remove(term, id);
        }
        Some(doc)
    }

    /// Restores derived in-memory structures after loading from a checkpoint.
    pub fn rebuild(&mut self) {
        self.store.rebuild_live();
    }

    pub fn doclength(&self, id: DocId) -> Result<u64> {
        self.store
            .doc_length(id)
            .ok_or_else(|| Error::not_found(format!("Document {} not found", id)))
    }

    pub fn termfreq(&self, term: &str) -> DocCount {
        self.dictionary.term_statistics(term).doc_freq
    }

    pub fn collection_freq(&self, term: &str) -> u64 {
        self.dictionary.term_statistics(term).collection_freq
    }

    pub fn allterms(&self, prefix: &str) -> TermIterator {
        TermIterator::new(
            self.dictionary
                .prefixed(prefix)
                .map(|(term, list)| TermEntry {
                    term: term.to_string(),
                    wdf: 0,
                    termfreq: list.doc_freq(),
                    positions: Vec::new(),
                })
                .collect(),
        )
    }

    /// Terms of a stored document with their collection-wide termfreq filled in.
    pub fn termlist(&self, id: DocId) -> Result<TermIterator> {
        let doc = self.store.get(id)?;
        Ok(TermIterator::new(
            doc.terms()
                .map(|(term, data)| TermEntry {
                    term: term.to_string(),
                    wdf: data.wdf,
                    termfreq: self.termfreq(term),
                    positions: data.positions.clone(),
                })
                .collect(),
        ))
    }

    /// Positions of `term` in document `id`; empty if the term is not indexed there.
    pub fn positionlist(&self, id: DocId, term: &str) -> Result<Vec<TermPos>> {
        let doc = self.store.get(id)?;
        Ok(doc.term(term).map(|data| data.positions.clone()).unwrap_or_default())
    }

    /// Closest word in the spelling table within `max_edit` edits.
    ///
    /// Ties go to the more frequent word, then the smaller one. A word that is
    /// itself in the table needs no correction.
    pub fn spelling_suggestion(&self, word: &str, max_edit: usize) -> Option<String> {
        if word.is_empty() || self.spelling.contains_key(word) {
            return None;
        }
        let max_edit = max_edit.min(MAX_SPELLING_EDIT as usize) as u8;
        let dfa = LevenshteinAutomatonBuilder::new(max_edit, true).build_dfa(word);
        self.spelling
            .iter()
            .filter_map(|(candidate, freq)| match dfa.eval(candidate) {
                Distance::Exact(distance) => Some((distance, Reverse(*freq), candidate)),
                Distance::AtLeast(_) => None,
            })
            .min()
            .map(|(_, _, candidate)| candidate.clone())
    }

    pub fn synonyms(&self, term: &str) -> TermIterator {
        let entries = self
            .synonyms
            .get(term)
            .map(|set| {
                set.iter()
                    .map(|synonym| TermEntry {
                        term: synonym.clone(),
                        wdf: 0,
                        termfreq: self.termfreq(synonym),
                        positions: Vec::new(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        TermIterator::new(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        let mut d = Document::new();
        for (i, word) in text.split_whitespace().enumerate() {
            d.add_posting(word, i as u32 + 1, 1).unwrap();
        }
        d
    }

    #[test]
    fn delete_restores_statistics() {
        let mut state = IndexState::new();
        state.replace_document(DocId(1), doc("the quick fox"));
        let before_fox = state.dictionary.term_statistics("fox");
        let before_avg = state.avlength();

        state.replace_document(DocId(2), doc("the slow fox runs"));
        assert_eq!(state.dictionary.term_statistics("fox").doc_freq, 2);
        state.delete_document(DocId(2)).unwrap();

        assert_eq!(state.dictionary.term_statistics("fox"), before_fox);
        assert_eq!(state.avlength(), before_avg);
        assert!(!state.dictionary.contains("slow"));
        assert_eq!(state.last_docid, 2);
    }

    #[test]
    fn replace_does_not_duplicate_postings() {
        let mut state = IndexState::new();
        state.replace_document(DocId(1), doc("fox fox"));
        state.replace_document(DocId(1), doc("fox"));
        let fox = state.dictionary.lookup("fox").unwrap();
        assert_eq!(fox.len(), 1);
        assert_eq!(fox.get(DocId(1)).unwrap().term_freq, 1);
        assert_eq!(state.total_length(), 1);
    }

    #[test]
    fn replace_of_missing_id_inserts_and_advances() {
        let mut state = IndexState::new();
        state.replace_document(DocId(10), doc("x"));
        assert_eq!(state.last_docid, 10);
        assert_eq!(state.doc_count(), 1);
        assert!(state.has_positions());
    }

    #[test]
    fn deleting_missing_document_via_change_fails() {
        let mut state = IndexState::new();
        let err = state.apply(&Change::DeleteDocument { id: DocId(4) }).unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::NotFound);
    }

    #[test]
    fn spelling_suggestion_prefers_close_then_frequent() {
        let mut state = IndexState::new();
        for (word, freq) in [("fox", 1), ("fix", 5), ("box", 2), ("foxes", 9)] {
            state.apply(&Change::AddSpelling { word: word.into(), freq }).unwrap();
        }
        assert_eq!(state.spelling_suggestion("fpx", 2).as_deref(), Some("fox"));
        assert_eq!(state.spelling_suggestion("fax", 1).as_deref(), Some("fix"));
        assert_eq!(state.spelling_suggestion("fox", 2), None);
        assert_eq!(state.spelling_suggestion("zzzzzz", 2), None);
    }

    #[test]
    fn spelling_suggestion_counts_transpositions_once() {
        let mut state = IndexState::new();
        state.apply(&Change::AddSpelling { word: "fox".into(), freq: 1 }).unwrap();
        assert_eq!(state.spelling_suggestion("fxo", 1).as_deref(), Some("fox"));
        assert_eq!(state.spelling_suggestion("fxo", 0), None);
        // Oversized distances are clamped rather than building a huge automaton.
        assert_eq!(state.spelling_suggestion("zzzzzzz", 100), None);
        assert_eq!(state.spelling_suggestion("zzz", 100).as_deref(), Some("fox"));
    }

    #[test]
    fn termlist_carries_termfreq() {
        let mut state = IndexState::new();
        state.replace_document(DocId(1), doc("red fox"));
        state.replace_document(DocId(2), doc("fox"));
        let terms: Vec<_> = state.termlist(DocId(1)).unwrap().map(|e| (e.term, e.termfreq)).collect();
        assert_eq!(terms, vec![("fox".to_string(), 2), ("red".to_string(), 1)]);
        assert_eq!(state.positionlist(DocId(1), "fox").unwrap(), vec![2]);
        assert!(state.positionlist(DocId(1), "cat").unwrap().is_empty());
        assert_eq!(state.termlist(DocId(9)).unwrap_err().kind, crate::core::error::ErrorKind::NotFound);
        assert_eq!(state.allterms("f").count(), 1);
    }

    #[test]
    fn spelling_and_synonym_changes() {
        let mut state = IndexState::new();
        state.apply(&Change::AddSpelling { word: "fox".into(), freq: 2 }).unwrap();
        state.apply(&Change::RemoveSpelling { word: "fox".into(), freq: 2 }).unwrap();
        assert!(state.spelling.is_empty());

        state.apply(&Change::AddSynonym { term: "fast".into(), synonym: "quick".into() }).unwrap();
        assert!(state.synonyms["fast"].contains("quick"));
        state.apply(&Change::ClearSynonyms { term: "fast".into() }).unwrap();
        assert!(state.synonyms.is_empty());
    }
}

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, Result};
use crate::core::types::{DocId, TermCount, TermPos, ValueSlot};
use crate::search::term_iterator::{TermEntry, TermIterator};

/// Per-term data held by a document: within-document frequency and positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermData {
    pub wdf: TermCount,
    pub positions: Vec<TermPos>,  // Sorted, no duplicates
}

/// A unit of indexing and retrieval.
///
/// A fresh document has docid 0; the id is filled in when it is read back
/// from a database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: DocId,
    data: String,
    values: BTreeMap<ValueSlot, String>,
    terms: BTreeMap<String, TermData>,
}

fn check_term(term: &str) -> Result<()> {
    if term.is_empty() {
        return Err(Error::invalid_argument("Empty termnames aren't allowed"));
    }
    Ok(())
}

impl Document {
    pub fn new() -> Self {
        Document::default()
    }

    pub fn get_docid(&self) -> DocId {
        self.id
    }

    pub(crate) fn set_docid(&mut self, id: DocId) {
        self.id = id;
    }

    // Values

    pub fn get_value(&self, slot: ValueSlot) -> Option<&str> {
        self.values.get(&slot).map(String::as_str)
    }

    /// Setting an empty value removes the slot.
    pub fn add_value(&mut self, slot: ValueSlot, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            self.values.remove(&slot);
        } else {
            self.values.insert(slot, value);
        }
    }

    pub fn remove_value(&mut self, slot: ValueSlot) {
        self.values.remove(&slot);
    }

    pub fn clear_values(&mut self) {
        self.values.clear();
    }

    pub fn values_count(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> impl Iterator<Item = (ValueSlot, &str)> {
        self.values.iter().map(|(slot, v)| (*slot, v.as_str()))
    }

    // Data

    pub fn get_data(&self) -> &str {
        &self.data
    }

    pub fn set_data(&mut self, data: impl Into<String>) {
        self.data = data.into();
    }

    // Terms

    pub fn add_posting(&mut self, term: impl Into<String>, pos: TermPos, wdf_inc: TermCount) -> Result<()> {
        let term = term.into();
        check_term(&term)?;
        let entry = self.terms.entry(term).or_default();
        entry.wdf += wdf_inc;
        if let Err(i) = entry.positions.binary_search(&pos) {
            entry.positions.insert(i, pos);
        }
        Ok(())
    }

    pub fn add_term(&mut self, term: impl Into<String>, wdf_inc: TermCount) -> Result<()> {
        let term = term.into();
        check_term(&term)?;
        self.terms.entry(term).or_default().wdf += wdf_inc;
        Ok(())
    }

    /// Filter term: present in the posting list but contributes nothing to length.
    pub fn add_boolean_term(&mut self, term: impl Into<String>) -> Result<()> {
        self.add_term(term, 0)
    }

    pub fn remove_posting(&mut self, term: &str, pos: TermPos, wdf_dec: TermCount) -> Result<()> {
        let entry = self.terms.get_mut(term).ok_or_else(|| {
            Error::not_found(format!("Term '{}' is not present in document", term))
        })?;
        let i = entry.positions.binary_search(&pos).map_err(|_| {
            Error::not_found(format!("Position {} not in list for term '{}'", pos, term))
        })?;
        entry.positions.remove(i);
        entry.wdf = entry.wdf.saturating_sub(wdf_dec);
        Ok(())
    }

    /// Removes every position of `term` in `[start, end]`, returning how many went.
    pub fn remove_postings(&mut self, term: &str, start: TermPos, end: TermPos, wdf_dec: TermCount) -> Result<TermCount> {
        let entry = self.terms.get_mut(term).ok_or_else(|| {
            Error::not_found(format!("Term '{}' is not present in document", term))
        })?;
        let before = entry.positions.len();
        entry.positions.retain(|p| *p < start || *p > end);
        let removed = (before - entry.positions.len()) as TermCount;
        entry.wdf = entry.wdf.saturating_sub(removed.saturating_mul(wdf_dec));
        Ok(removed)
    }

    pub fn remove_term(&mut self, term: &str) -> Result<()> {
        self.terms
            .remove(term)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("Term '{}' is not present in document", term)))
    }

    pub fn clear_terms(&mut self) {
        self.terms.clear();
    }

    pub fn termlist_count(&self) -> usize {
        self.terms.len()
    }

    pub fn term(&self, term: &str) -> Option<&TermData> {
        self.terms.get(term)
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, &TermData)> {
        self.terms.iter().map(|(t, d)| (t.as_str(), d))
    }

    pub fn termlist(&self) -> TermIterator {
        TermIterator::new(
            self.terms
                .iter()
                .map(|(term, data)| TermEntry {
                    term: term.clone(),
                    wdf: data.wdf,
                    termfreq: 0,
                    positions: data.positions.clone(),
                })
                .collect(),
        )
    }

    /// Sum of wdf over all terms.
    pub fn length(&self) -> u64 {
        self.terms.values().map(|d| d.wdf as u64).sum()
    }

    pub fn has_positions(&self) -> bool {
        self.terms.values().any(|d| !d.positions.is_empty())
    }

    pub fn serialise(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn unserialise(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn description(&self) -> String {
        format!(
            "Document(docid={}, data={:?}, terms={}, values={})",
            self.id,
            self.data,
            self.terms.len(),
            self.values.len()
        )
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn postings_accumulate_wdf_and_positions() {
        let mut doc = Document::new();
        doc.add_posting("fox", 3, 1).unwrap();
        doc.add_posting("fox", 1, 1).unwrap();
        doc.add_term("Zfox", 1).unwrap();
        doc.add_boolean_term("XTAG").unwrap();

        let fox = doc.term("fox").unwrap();
        assert_eq!(fox.wdf, 2);
        assert_eq!(fox.positions, vec![1, 3]);
        assert_eq!(doc.term("XTAG").unwrap().wdf, 0);
        assert_eq!(doc.length(), 3);
        assert_eq!(doc.termlist_count(), 3);
    }

    #[test]
    fn empty_term_is_rejected() {
        let mut doc = Document::new();
        assert_eq!(doc.add_term("", 1).unwrap_err().kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn remove_postings_in_range() {
        let mut doc = Document::new();
        for pos in 1..=5 {
            doc.add_posting("a", pos, 1).unwrap();
        }
        assert_eq!(doc.remove_postings("a", 2, 4, 1).unwrap(), 3);
        assert_eq!(doc.term("a").unwrap().positions, vec![1, 5]);
        assert_eq!(doc.term("a").unwrap().wdf, 2);
        assert_eq!(doc.remove_posting("a", 3, 1).unwrap_err().kind, ErrorKind::NotFound);
        assert_eq!(doc.remove_term("missing").unwrap_err().kind, ErrorKind::NotFound);
    }

    #[test]
    fn values_and_data() {
        let mut doc = Document::new();
        doc.set_data("payload");
        doc.add_value(1, "b");
        doc.add_value(0, "a");
        doc.add_value(2, "");
        assert_eq!(doc.values_count(), 2);
        assert_eq!(doc.get_value(0), Some("a"));
        assert_eq!(doc.values().map(|(s, _)| s).collect::<Vec<_>>(), vec![0, 1]);
        doc.remove_value(0);
        assert_eq!(doc.get_value(0), None);
        assert_eq!(doc.get_data(), "payload");
    }

    #[test]
    fn serialise_preserves_contents() {
        let mut doc = Document::new();
        doc.set_data("x");
        doc.add_posting("word", 1, 1).unwrap();
        doc.add_value(7, "v");
        let back = Document::unserialise(&doc.serialise().unwrap()).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn termlist_is_sorted() {
        let mut doc = Document::new();
        doc.add_term("b", 1).unwrap();
        doc.add_term("a", 2).unwrap();
        let terms: Vec<(String, u32)> = doc.termlist().map(|e| (e.term, e.wdf)).collect();
        assert_eq!(terms, vec![("a".to_string(), 2), ("b".to_string(), 1)]);
    }
}

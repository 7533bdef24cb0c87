use serde::{Serialize, Deserialize};
use crate::core::document::Document;
use crate::core::types::DocId;

/// One logged mutation. Ids are resolved before a change is recorded,
/// so replaying a batch always lands on the same state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change {
    AddDocument { id: DocId, doc: Document },
    ReplaceDocument { id: DocId, doc: Document },
    DeleteDocument { id: DocId },
    SetMetadata { key: String, value: String },
    AddSpelling { word: String, freq: u32 },
    RemoveSpelling { word: String, freq: u32 },
    AddSynonym { term: String, synonym: String },
    RemoveSynonym { term: String, synonym: String },
    ClearSynonyms { term: String },
}

/// Changes made since the last commit, in order.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub buffer: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        ChangeSet::default()
    }

    pub fn push(&mut self, change: Change) {
        self.buffer.push(change);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drops everything recorded after `mark` (a previous `len()`).
    pub fn rollback_to(&mut self, mark: usize) {
        self.buffer.truncate(mark);
    }

    pub fn take(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.buffer)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.buffer.iter()
    }
}

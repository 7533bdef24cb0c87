use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::index::state::IndexState;

/// Database statistics for monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub uuid: Uuid,
    pub revision: u64,

    // Index
    pub doc_count: u64,
    pub last_docid: u32,
    pub term_count: usize,
    pub total_length: u64,
    pub average_length: f64,
    pub has_positions: bool,

    // Side tables
    pub spelling_words: usize,
    pub synonym_keys: usize,
    pub metadata_keys: usize,

    // Writer only; zero for readers
    pub pending_changes: usize,
    pub wal_size_bytes: u64,
    pub last_commit_time: Option<DateTime<Utc>>,
}

impl DatabaseStats {
    pub fn from_state(state: &IndexState) -> Self {
        DatabaseStats {
            uuid: state.uuid,
            revision: state.revision,
            doc_count: state.doc_count(),
            last_docid: state.last_docid,
            term_count: state.dictionary.len(),
            total_length: state.total_length(),
            average_length: state.avlength(),
            has_positions: state.has_positions(),
            spelling_words: state.spelling.len(),
            synonym_keys: state.synonyms.len(),
            metadata_keys: state.metadata.len(),
            pending_changes: 0,
            wal_size_bytes: 0,
            last_commit_time: None,
        }
    }
}

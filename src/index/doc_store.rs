use std::collections::BTreeMap;
use std::sync::Arc;
use roaring::RoaringBitmap;
use serde::{Serialize, Deserialize};
use crate::core::document::Document;
use crate::core::error::{Error, Result};
use crate::core::types::{DocId, ValueSlot};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDoc {
    doc: Arc<Document>,
    length: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreStats {
    pub document_count: u64,
    pub average_length: f64,
}

/// Documents by id, plus the live-id bitmap and per-slot value streams.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentStore {
    docs: BTreeMap<DocId, StoredDoc>,
    values: BTreeMap<ValueSlot, Arc<BTreeMap<DocId, String>>>,
    total_length: u64,
    #[serde(skip)]
    live: RoaringBitmap,
}

impl DocumentStore {
    pub fn new() -> Self {
        DocumentStore::default()
    }

    pub fn get(&self, id: DocId) -> Result<Arc<Document>> {
        self.docs
            .get(&id)
            .map(|stored| Arc::clone(&stored.doc))
            .ok_or_else(|| Error::not_found(format!("Document {} not found", id)))
    }

    pub fn contains(&self, id: DocId) -> bool {
        self.docs.contains_key(&id)
    }

    pub fn doc_length(&self, id: DocId) -> Option<u64> {
        self.docs.get(&id).map(|stored| stored.length)
    }

    /// Stores `doc` under `id`; the caller has already removed any previous version.
    pub fn put(&mut self, id: DocId, mut doc: Document) -> Arc<Document> {
        doc.set_docid(id);
        for (slot, value) in doc.values() {
            Arc::make_mut(self.values.entry(slot).or_default()).insert(id, value.to_string());
        }
        let length = doc.length();
        let doc = Arc::new(doc);

        self.total_length += length;
        self.live.insert(id.0);
        self.docs.insert(id, StoredDoc { doc: Arc::clone(&doc), length });
        doc
    }

    pub fn delete(&mut self, id: DocId) -> Option<Arc<Document>> {
        let stored = self.docs.remove(&id)?;
        for (slot, _) in stored.doc.values() {
            if let Some(stream) = self.values.get_mut(&slot) {
                let stream = Arc::make_mut(stream);
                stream.remove(&id);
                if stream.is_empty() {
                    self.values.remove(&slot);
                }
            }
        }
        self.total_length -= stored.length;
        self.live.remove(id.0);
        Some(stored.doc)
    }

    pub fn len(&self) -> u64 {
        self.docs.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn statistics(&self) -> StoreStats {
        let document_count = self.len();
        let average_length = if document_count == 0 {
            0.0
        } else {
            self.total_length as f64 / document_count as f64
        };
        StoreStats { document_count, average_length }
    }

    pub fn live(&self) -> &RoaringBitmap {
        &self.live
    }

    /// Values stored in `slot`, by document.
    pub fn value_stream(&self, slot: ValueSlot) -> Option<&BTreeMap<DocId, String>> {
        self.values.get(&slot).map(Arc::as_ref)
    }

    pub fn ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.docs.keys().copied()
    }

    pub fn documents(&self) -> impl Iterator<Item = &Arc<Document>> {
        self.docs.values().map(|stored| &stored.doc)
    }

    /// Recomputes the live bitmap after deserialisation.
    pub fn rebuild_live(&mut self) {
        self.live = self.docs.keys().map(|id| id.0).collect();
    }
}

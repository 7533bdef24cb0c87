use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;
use crate::analysis::term_generator::TermGenerator;
use crate::core::config::{Config, OpenMode};
use crate::core::database::{compact_into, Database};
use crate::core::document::Document;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::DatabaseStats;
use crate::core::types::{DocCount, DocId, TermCount, TermPos};
use crate::index::state::IndexState;
use crate::mvcc::controller::MVCCController;
use crate::search::term_iterator::TermIterator;
use crate::storage::backend::MemoryBackend;
use crate::storage::checkpoint::{Checkpoint, RecoveryManager};
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::storage::wal::{SyncMode, WALEntry, WAL};
use crate::writer::batch::{Change, ChangeSet};

/// On-disk half of a writer. The lock is released when this is dropped.
struct DiskStorage {
    manager: RecoveryManager,
    path: PathBuf,
    _lock: FileLock,
}

/// Undo information for an open transaction.
struct Transaction {
    flushed: bool,
    mark: usize,
    base: Arc<IndexState>,
}

/// The single writer of a database.
///
/// Changes apply to a private working state straight away, so reads through
/// this handle see them; readers only see them once `commit` has logged the
/// batch and published the new revision.
pub struct WritableDatabase {
    config: Config,
    storage: Option<DiskStorage>,
    wal: WAL,
    working: Arc<IndexState>,
    pending: ChangeSet,
    transaction: Option<Transaction>,
    mvcc: Arc<MVCCController>,
    commits_since_checkpoint: u32,
    last_commit: Option<DateTime<Utc>>,
}

impl WritableDatabase {
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        Self::open_with_config(path, mode, Config::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, mode: OpenMode, config: Config) -> Result<Self> {
        let path = path.as_ref();
        let exists = StorageLayout::existing(path).is_ok();
        match mode {
            OpenMode::Create if exists => {
                return Err(Error::invalid_argument(format!("Database already exists at {}", path.display())));
            }
            OpenMode::Open if !exists => {
                return Err(Error::not_found(format!("No database at {}", path.display())));
            }
            _ => {}
        }

        let layout = StorageLayout::create(path)?;
        let lock = FileLock::acquire(
            &layout,
            config.lock_retry_attempts,
            Duration::from_millis(config.lock_retry_interval_ms),
        )?;
        if mode == OpenMode::CreateOrOverwrite && exists {
            info!(path = %path.display(), "overwriting existing database");
            layout.clear()?;
        }

        let is_new = !layout.checkpoint_path().exists() && layout.wal_files()?.is_empty();
        let manager = RecoveryManager::new(layout, config.sync_mode);
        let (state, wal) = manager.recover()?;
        if is_new {
            // Persists the uuid before anything else is written
            Checkpoint::save(&state, &manager.storage, config.compression, config.sync_mode)?;
        }
        info!(
            path = %path.display(),
            revision = state.revision,
            docs = state.doc_count(),
            created = is_new,
            "opened writable database"
        );

        let working = Arc::new(state);
        Ok(WritableDatabase {
            mvcc: Arc::new(MVCCController::new(Arc::clone(&working))),
            storage: Some(DiskStorage { manager, path: path.to_path_buf(), _lock: lock }),
            wal,
            working,
            pending: ChangeSet::new(),
            transaction: None,
            commits_since_checkpoint: 0,
            last_commit: None,
            config,
        })
    }

    /// A database living only in this process; nothing touches the disk.
    pub fn in_memory() -> Self {
        let config = Config { sync_mode: SyncMode::None, ..Config::default() };
        let working = Arc::new(IndexState::new());
        WritableDatabase {
            mvcc: Arc::new(MVCCController::new(Arc::clone(&working))),
            storage: None,
            wal: memory_wal(),
            working,
            pending: ChangeSet::new(),
            transaction: None,
            commits_since_checkpoint: 0,
            last_commit: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A read-only handle that follows this writer's commits on `reopen`.
    pub fn reader(&self) -> Database {
        let path = self.storage.as_ref().map(|disk| disk.path.clone());
        Database::from_writer(&self.mvcc, self.config.clone(), path)
    }

    fn record(&mut self, change: Change) -> Result<()> {
        Arc::make_mut(&mut self.working).apply(&change)?;
        self.pending.push(change);
        Ok(())
    }

    /// Stores `doc` under the next free id and returns that id.
    pub fn add_document(&mut self, doc: Document) -> Result<DocId> {
        let next = self
            .working
            .last_docid
            .checked_add(1)
            .ok_or_else(|| Error::new(ErrorKind::InvalidState, "Document ids exhausted"))?;
        let id = DocId(next);
        self.record(Change::AddDocument { id, doc })?;
        Ok(id)
    }

    /// Replaces the document under `id`, inserting it if there is none.
    pub fn replace_document(&mut self, id: DocId, doc: Document) -> Result<()> {
        check_docid(id)?;
        self.record(Change::ReplaceDocument { id, doc })
    }

    /// Replaces the first document indexed by `term` and deletes the rest.
    /// With no such document, adds `doc` and returns its new id.
    pub fn replace_document_by_term(&mut self, term: &str, doc: Document) -> Result<DocId> {
        let ids = self.docs_with_term(term)?;
        let Some((first, rest)) = ids.split_first() else {
            return self.add_document(doc);
        };
        self.record(Change::ReplaceDocument { id: *first, doc })?;
        for id in rest {
            self.record(Change::DeleteDocument { id: *id })?;
        }
        Ok(*first)
    }

    pub fn delete_document(&mut self, id: DocId) -> Result<()> {
        check_docid(id)?;
        self.record(Change::DeleteDocument { id })
    }

    /// Deletes every document indexed by `term`; returns how many went.
    pub fn delete_document_by_term(&mut self, term: &str) -> Result<usize> {
        let ids = self.docs_with_term(term)?;
        for id in &ids {
            self.record(Change::DeleteDocument { id: *id })?;
        }
        Ok(ids.len())
    }

    fn docs_with_term(&self, term: &str) -> Result<Vec<DocId>> {
        if term.is_empty() {
            return Err(Error::invalid_argument("Empty termnames aren't allowed"));
        }
        Ok(self
            .working
            .dictionary
            .lookup(term)
            .map(|list| list.postings.iter().map(|p| p.doc_id).collect())
            .unwrap_or_default())
    }

    /// An empty `value` removes the key.
    pub fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::invalid_argument("Empty metadata keys are invalid"));
        }
        self.record(Change::SetMetadata { key: key.to_string(), value: value.to_string() })
    }

    pub fn add_spelling(&mut self, word: &str, freq: TermCount) -> Result<()> {
        if word.is_empty() || freq == 0 {
            return Ok(());
        }
        self.record(Change::AddSpelling { word: word.to_string(), freq })
    }

    pub fn remove_spelling(&mut self, word: &str, freq: TermCount) -> Result<()> {
        if !self.working.spelling.contains_key(word) {
            return Ok(());
        }
        self.record(Change::RemoveSpelling { word: word.to_string(), freq })
    }

    /// Feeds the words a `FLAG_SPELLING` term generator collected into the spelling table.
    pub fn add_spellings_from(&mut self, generator: &mut TermGenerator) -> Result<()> {
        for (word, freq) in generator.take_spelling_words() {
            self.add_spelling(&word, freq)?;
        }
        Ok(())
    }

    pub fn add_synonym(&mut self, term: &str, synonym: &str) -> Result<()> {
        if term.is_empty() || synonym.is_empty() {
            return Err(Error::invalid_argument("Synonym terms must not be empty"));
        }
        self.record(Change::AddSynonym { term: term.to_string(), synonym: synonym.to_string() })
    }

    pub fn remove_synonym(&mut self, term: &str, synonym: &str) -> Result<()> {
        self.record(Change::RemoveSynonym { term: term.to_string(), synonym: synonym.to_string() })
    }

    pub fn clear_synonyms(&mut self, term: &str) -> Result<()> {
        self.record(Change::ClearSynonyms { term: term.to_string() })
    }

    /// Makes every pending change durable and visible to readers as one revision.
    ///
    /// On failure nothing is published and the changes stay pending.
    pub fn commit(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(Error::new(ErrorKind::InvalidState, "Cannot commit inside a transaction"));
        }
        self.flush_pending()
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let entry = WALEntry {
            revision: self.working.revision + 1,
            timestamp: Utc::now(),
            changes: self.pending.take(),
        };
        if let Err(e) = self.wal.append(&entry) {
            warn!(revision = entry.revision, error = %e, "commit failed");
            self.pending.buffer = entry.changes;
            return Err(e);
        }

        Arc::make_mut(&mut self.working).revision = entry.revision;
        self.mvcc.publish(Arc::clone(&self.working));
        self.commits_since_checkpoint += 1;
        self.last_commit = Some(entry.timestamp);
        debug!(revision = entry.revision, changes = entry.changes.len(), "committed");

        // The commit is durable in the WAL already; a failed checkpoint only delays compaction
        if let Err(e) = self.maybe_checkpoint() {
            warn!(revision = entry.revision, error = %e, "checkpoint failed, WAL kept");
        }
        Ok(())
    }

    fn maybe_checkpoint(&mut self) -> Result<()> {
        let by_count = self.config.checkpoint_interval > 0
            && self.commits_since_checkpoint >= self.config.checkpoint_interval;
        let by_size = self.wal.size() >= self.config.wal_max_bytes;
        if !by_count && !by_size {
            return Ok(());
        }

        match &self.storage {
            Some(disk) => {
                Checkpoint::save(&self.working, &disk.manager.storage, self.config.compression, self.config.sync_mode)?;
                self.wal = disk.manager.rotate(self.working.revision)?;
            }
            None => self.wal = memory_wal(),
        }
        self.commits_since_checkpoint = 0;
        Ok(())
    }

    /// Starts a transaction. A flushed transaction commits pending changes
    /// first and commits its own changes when it ends.
    pub fn begin_transaction(&mut self, flushed: bool) -> Result<()> {
        if self.transaction.is_some() {
            return Err(Error::new(ErrorKind::InvalidState, "Transaction already in progress"));
        }
        if flushed {
            self.flush_pending()?;
        }
        self.transaction = Some(Transaction {
            flushed,
            mark: self.pending.len(),
            base: Arc::clone(&self.working),
        });
        Ok(())
    }

    pub fn commit_transaction(&mut self) -> Result<()> {
        let Some(transaction) = self.transaction.take() else {
            return Err(Error::new(ErrorKind::InvalidState, "No transaction in progress"));
        };
        if transaction.flushed {
            self.flush_pending()?;
        }
        Ok(())
    }

    /// Throws away every change made since `begin_transaction`.
    pub fn cancel_transaction(&mut self) -> Result<()> {
        let Some(transaction) = self.transaction.take() else {
            return Err(Error::new(ErrorKind::InvalidState, "No transaction in progress"));
        };
        self.pending.rollback_to(transaction.mark);
        self.working = transaction.base;
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Cancels any open transaction, commits pending changes and checkpoints.
    pub fn close(mut self) -> Result<()> {
        if self.transaction.is_some() {
            self.cancel_transaction()?;
        }
        self.flush_pending()?;
        if let Some(disk) = &self.storage {
            if self.commits_since_checkpoint > 0 {
                Checkpoint::save(&self.working, &disk.manager.storage, self.config.compression, self.config.sync_mode)?;
                self.wal = disk.manager.rotate(self.working.revision)?;
                self.commits_since_checkpoint = 0;
            }
        }
        Ok(())
    }

    /// Writes the last committed revision as a new database at `dest`.
    pub fn compact(&self, dest: impl AsRef<Path>) -> Result<()> {
        let committed = self.mvcc.current_snapshot();
        compact_into(&committed.state, dest.as_ref(), &self.config)
    }

    pub fn doccount(&self) -> u64 {
        self.working.doc_count()
    }

    pub fn lastdocid(&self) -> DocId {
        DocId(self.working.last_docid)
    }

    pub fn avlength(&self) -> f64 {
        self.working.avlength()
    }

    pub fn total_length(&self) -> u64 {
        self.working.total_length()
    }

    pub fn doclength(&self, id: DocId) -> Result<u64> {
        self.working.doclength(id)
    }

    pub fn get_document(&self, id: DocId) -> Result<Document> {
        let doc = self.working.store.get(id)?;
        Ok(Document::clone(&doc))
    }

    pub fn termfreq(&self, term: &str) -> DocCount {
        self.working.termfreq(term)
    }

    pub fn collection_freq(&self, term: &str) -> u64 {
        self.working.collection_freq(term)
    }

    pub fn term_exists(&self, term: &str) -> bool {
        self.working.dictionary.contains(term)
    }

    pub fn allterms(&self, prefix: &str) -> TermIterator {
        self.working.allterms(prefix)
    }

    pub fn termlist(&self, id: DocId) -> Result<TermIterator> {
        self.working.termlist(id)
    }

    pub fn positionlist(&self, id: DocId, term: &str) -> Result<Vec<TermPos>> {
        self.working.positionlist(id, term)
    }

    pub fn get_metadata(&self, key: &str) -> String {
        self.working.metadata.get(key).cloned().unwrap_or_default()
    }

    pub fn get_uuid(&self) -> Uuid {
        self.working.uuid
    }

    pub fn has_positions(&self) -> bool {
        self.working.has_positions()
    }

    /// Last committed revision.
    pub fn revision(&self) -> u64 {
        self.working.revision
    }

    pub fn spelling_suggestion(&self, word: &str, max_edit: usize) -> Option<String> {
        self.working.spelling_suggestion(word, max_edit)
    }

    pub fn synonyms(&self, term: &str) -> TermIterator {
        self.working.synonyms(term)
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            pending_changes: self.pending.len(),
            wal_size_bytes: self.wal.size(),
            last_commit_time: self.last_commit,
            ..DatabaseStats::from_state(&self.working)
        }
    }

    pub fn description(&self) -> String {
        let location = match &self.storage {
            Some(disk) => disk.path.display().to_string(),
            None => "in-memory".to_string(),
        };
        format!(
            "WritableDatabase({}, revision={}, docs={}, pending={})",
            location,
            self.working.revision,
            self.working.doc_count(),
            self.pending.len()
        )
    }
}

impl Drop for WritableDatabase {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            debug!(changes = self.pending.len(), "discarding uncommitted changes");
        }
    }
}

fn memory_wal() -> WAL {
    WAL {
        backend: Box::new(MemoryBackend::new()),
        position: 0,
        sync_mode: SyncMode::None,
    }
}

fn check_docid(id: DocId) -> Result<()> {
    if id.0 == 0 {
        return Err(Error::invalid_argument("Document id 0 is invalid"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{DB_CREATE, DB_CREATE_OR_OPEN, DB_CREATE_OR_OVERWRITE, DB_OPEN};

    fn doc(text: &str) -> Document {
        let mut d = Document::new();
        d.set_data(text);
        for (i, word) in text.split(' ').enumerate() {
            d.add_posting(word, i as u32 + 1, 1).unwrap();
        }
        d
    }

    #[test]
    fn ids_are_assigned_in_order() {
        let mut db = WritableDatabase::in_memory();
        assert_eq!(db.add_document(doc("a")).unwrap(), DocId(1));
        assert_eq!(db.add_document(doc("b")).unwrap(), DocId(2));
        db.replace_document(DocId(10), doc("c")).unwrap();
        assert_eq!(db.add_document(doc("d")).unwrap(), DocId(11));
        assert_eq!(db.replace_document(DocId(0), doc("x")).unwrap_err().kind, ErrorKind::InvalidArgument);
        assert_eq!(db.delete_document(DocId(5)).unwrap_err().kind, ErrorKind::NotFound);
    }

    #[test]
    fn readers_see_only_commits() {
        let mut db = WritableDatabase::in_memory();
        let reader = db.reader();
        db.add_document(doc("red fox")).unwrap();
        assert_eq!(db.doccount(), 1);

        reader.reopen().unwrap();
        assert_eq!(reader.doccount().unwrap(), 0);

        db.commit().unwrap();
        assert!(reader.reopen().unwrap());
        assert_eq!(reader.doccount().unwrap(), 1);
        assert_eq!(db.revision(), 1);
        assert_eq!(db.stats().pending_changes, 0);
    }

    #[test]
    fn replace_and_delete_by_term() {
        let mut db = WritableDatabase::in_memory();
        for text in ["id:1 old", "id:1 older", "id:2 other"] {
            db.add_document(doc(text)).unwrap();
        }
        let id = db.replace_document_by_term("id:1", doc("id:1 new")).unwrap();
        assert_eq!(id, DocId(1));
        assert_eq!(db.termfreq("id:1"), 1);
        assert_eq!(db.get_document(DocId(1)).unwrap().get_data(), "id:1 new");
        assert!(db.get_document(DocId(2)).is_err());

        let added = db.replace_document_by_term("id:9", doc("id:9 fresh")).unwrap();
        assert_eq!(added, DocId(4));

        assert_eq!(db.delete_document_by_term("id:2").unwrap(), 1);
        assert_eq!(db.delete_document_by_term("id:2").unwrap(), 0);
        assert_eq!(db.doccount(), 2);
    }

    #[test]
    fn cancelled_transaction_restores_working_state() {
        let mut db = WritableDatabase::in_memory();
        db.add_document(doc("keep")).unwrap();
        db.begin_transaction(false).unwrap();
        assert_eq!(db.begin_transaction(false).unwrap_err().kind, ErrorKind::InvalidState);
        db.add_document(doc("drop me")).unwrap();
        db.set_metadata("k", "v").unwrap();
        assert_eq!(db.commit().unwrap_err().kind, ErrorKind::InvalidState);
        db.cancel_transaction().unwrap();

        assert_eq!(db.doccount(), 1);
        assert_eq!(db.get_metadata("k"), "");
        assert_eq!(db.lastdocid(), DocId(1));
        db.commit().unwrap();
        assert_eq!(db.reader().doccount().unwrap(), 1);
        assert_eq!(db.cancel_transaction().unwrap_err().kind, ErrorKind::InvalidState);
    }

    #[test]
    fn flushed_transaction_commits_on_end() {
        let mut db = WritableDatabase::in_memory();
        db.begin_transaction(true).unwrap();
        db.add_document(doc("a")).unwrap();
        db.commit_transaction().unwrap();
        assert_eq!(db.revision(), 1);
        assert_eq!(db.reader().doccount().unwrap(), 1);
    }

    #[test]
    fn spelling_synonyms_and_metadata() {
        let mut db = WritableDatabase::in_memory();
        db.add_spelling("fox", 3).unwrap();
        db.add_synonym("quick", "fast").unwrap();
        db.add_synonym("quick", "rapid").unwrap();
        db.set_metadata("owner", "me").unwrap();
        db.commit().unwrap();

        assert_eq!(db.spelling_suggestion("fax", 1).as_deref(), Some("fox"));
        let synonyms: Vec<String> = db.synonyms("quick").map(|e| e.term).collect();
        assert_eq!(synonyms, vec!["fast", "rapid"]);

        db.remove_synonym("quick", "fast").unwrap();
        db.remove_spelling("fox", 3).unwrap();
        db.set_metadata("owner", "").unwrap();
        assert_eq!(db.synonyms("quick").count(), 1);
        assert_eq!(db.spelling_suggestion("fax", 1), None);
        assert_eq!(db.get_metadata("owner"), "");
        assert!(db.set_metadata("", "x").is_err());
    }

    #[test]
    fn open_modes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");

        assert_eq!(WritableDatabase::open(&path, DB_OPEN).err().map(|e| e.kind), Some(ErrorKind::NotFound));

        let mut db = WritableDatabase::open(&path, DB_CREATE).unwrap();
        let uuid = db.get_uuid();
        db.add_document(doc("persisted")).unwrap();
        db.commit().unwrap();
        drop(db);

        assert!(WritableDatabase::open(&path, DB_CREATE).is_err());

        let db = WritableDatabase::open(&path, DB_CREATE_OR_OPEN).unwrap();
        assert_eq!(db.doccount(), 1);
        assert_eq!(db.get_uuid(), uuid);
        drop(db);

        let db = WritableDatabase::open(&path, DB_CREATE_OR_OVERWRITE).unwrap();
        assert_eq!(db.doccount(), 0);
        assert_ne!(db.get_uuid(), uuid);
    }

    #[test]
    fn checkpoint_interval_rotates_wal() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config { checkpoint_interval: 2, ..Config::default() }.no_sync();
        let mut db = WritableDatabase::open_with_config(dir.path(), DB_CREATE_OR_OPEN, config.clone()).unwrap();
        for text in ["a", "b", "c"] {
            db.add_document(doc(text)).unwrap();
            db.commit().unwrap();
        }
        let layout = StorageLayout::existing(dir.path()).unwrap();
        assert_eq!(layout.wal_files().unwrap(), vec![2]);
        drop(db);

        let db = WritableDatabase::open_with_config(dir.path(), DB_OPEN, config).unwrap();
        assert_eq!(db.revision(), 3);
        assert_eq!(db.doccount(), 3);
    }

    #[test]
    fn close_checkpoints_pending_work() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = WritableDatabase::open(dir.path(), DB_CREATE_OR_OPEN).unwrap();
        db.add_document(doc("closing")).unwrap();
        db.close().unwrap();

        let layout = StorageLayout::existing(dir.path()).unwrap();
        assert_eq!(layout.wal_files().unwrap(), vec![1]);
        let reader = Database::open(dir.path()).unwrap();
        assert_eq!(reader.doccount().unwrap(), 1);
    }
}

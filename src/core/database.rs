use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;
use crate::core::config::Config;
use crate::core::document::Document;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::DatabaseStats;
use crate::core::types::{DocCount, DocId, TermPos};
use crate::index::state::IndexState;
use crate::mvcc::controller::MVCCController;
use crate::search::term_iterator::TermIterator;
use crate::storage::checkpoint::{Checkpoint, RecoveryManager};
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;

/// Where a reader gets fresh revisions from on `reopen`.
enum Source {
    Disk(RecoveryManager),
    Writer(Weak<MVCCController>),
}

struct Handle {
    source: Source,
    state: Arc<IndexState>,
}

struct Inner {
    config: Config,
    path: Option<PathBuf>,
    handle: RwLock<Option<Handle>>,
}

/// Read-only view of a database, pinned to one revision until `reopen`.
///
/// Cloning is cheap and clones share the pinned revision, so an `Enquire`
/// built from this handle sees the result of a later `reopen` too.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, Config::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        let layout = StorageLayout::existing(path.as_ref())?;
        let manager = RecoveryManager::new(layout, config.sync_mode);
        let state = Arc::new(manager.load_committed()?);
        info!(
            path = %path.as_ref().display(),
            revision = state.revision,
            docs = state.doc_count(),
            "opened database"
        );

        Ok(Database {
            inner: Arc::new(Inner {
                config,
                path: Some(path.as_ref().to_path_buf()),
                handle: RwLock::new(Some(Handle { source: Source::Disk(manager), state })),
            }),
        })
    }

    /// A reader over the snapshots a writer publishes.
    pub(crate) fn from_writer(controller: &Arc<MVCCController>, config: Config, path: Option<PathBuf>) -> Self {
        let state = Arc::clone(&controller.current_snapshot().state);
        Database {
            inner: Arc::new(Inner {
                config,
                path,
                handle: RwLock::new(Some(Handle {
                    source: Source::Writer(Arc::downgrade(controller)),
                    state,
                })),
            }),
        }
    }

    /// The pinned revision. Fails once the database has been closed.
    pub(crate) fn state(&self) -> Result<Arc<IndexState>> {
        self.inner
            .handle
            .read()
            .as_ref()
            .map(|handle| Arc::clone(&handle.state))
            .ok_or_else(closed)
    }

    fn with<T>(&self, f: impl FnOnce(&IndexState) -> T) -> Result<T> {
        let state = self.state()?;
        Ok(f(&state))
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Moves to the latest committed revision. Returns whether anything changed.
    pub fn reopen(&self) -> Result<bool> {
        let mut guard = self.inner.handle.write();
        let handle = guard.as_mut().ok_or_else(closed)?;

        let fresh = match &handle.source {
            Source::Disk(manager) => Arc::new(manager.load_committed()?),
            Source::Writer(controller) => match controller.upgrade() {
                Some(controller) => Arc::clone(&controller.current_snapshot().state),
                // Writer is gone; its last commit is already pinned
                None => return Ok(false),
            },
        };

        if fresh.revision == handle.state.revision && fresh.uuid == handle.state.uuid {
            return Ok(false);
        }
        debug!(from = handle.state.revision, to = fresh.revision, "reopened database");
        handle.state = fresh;
        Ok(true)
    }

    /// Releases the pinned revision. Every later call fails with `InvalidState`.
    pub fn close(&self) {
        self.inner.handle.write().take();
    }

    /// Whether a writer currently holds this database.
    pub fn locked(&self) -> Result<bool> {
        let guard = self.inner.handle.read();
        let handle = guard.as_ref().ok_or_else(closed)?;
        match &handle.source {
            Source::Disk(manager) => FileLock::is_locked(&manager.storage),
            Source::Writer(controller) => Ok(controller.strong_count() > 0),
        }
    }

    /// Writes the pinned revision as a fresh single-checkpoint database at `dest`.
    pub fn compact(&self, dest: impl AsRef<Path>) -> Result<()> {
        let state = self.state()?;
        compact_into(&state, dest.as_ref(), &self.inner.config)
    }

    pub fn doccount(&self) -> Result<u64> {
        self.with(|s| s.doc_count())
    }

    pub fn lastdocid(&self) -> Result<DocId> {
        self.with(|s| DocId(s.last_docid))
    }

    pub fn avlength(&self) -> Result<f64> {
        self.with(|s| s.avlength())
    }

    pub fn total_length(&self) -> Result<u64> {
        self.with(|s| s.total_length())
    }

    pub fn doclength(&self, id: DocId) -> Result<u64> {
        self.state()?.doclength(id)
    }

    pub fn get_document(&self, id: DocId) -> Result<Document> {
        let doc = self.state()?.store.get(id)?;
        Ok(Document::clone(&doc))
    }

    pub fn termfreq(&self, term: &str) -> Result<DocCount> {
        self.with(|s| s.termfreq(term))
    }

    pub fn collection_freq(&self, term: &str) -> Result<u64> {
        self.with(|s| s.collection_freq(term))
    }

    pub fn term_exists(&self, term: &str) -> Result<bool> {
        self.with(|s| s.dictionary.contains(term))
    }

    pub fn allterms(&self, prefix: &str) -> Result<TermIterator> {
        self.with(|s| s.allterms(prefix))
    }

    pub fn termlist(&self, id: DocId) -> Result<TermIterator> {
        self.state()?.termlist(id)
    }

    pub fn positionlist(&self, id: DocId, term: &str) -> Result<Vec<TermPos>> {
        self.state()?.positionlist(id, term)
    }

    /// Empty string when `key` is unset.
    pub fn get_metadata(&self, key: &str) -> Result<String> {
        self.with(|s| s.metadata.get(key).cloned().unwrap_or_default())
    }

    pub fn get_uuid(&self) -> Result<Uuid> {
        self.with(|s| s.uuid)
    }

    pub fn has_positions(&self) -> Result<bool> {
        self.with(|s| s.has_positions())
    }

    pub fn revision(&self) -> Result<u64> {
        self.with(|s| s.revision)
    }

    pub fn spelling_suggestion(&self, word: &str, max_edit: usize) -> Result<Option<String>> {
        self.with(|s| s.spelling_suggestion(word, max_edit))
    }

    pub fn synonyms(&self, term: &str) -> Result<TermIterator> {
        self.with(|s| s.synonyms(term))
    }

    pub fn stats(&self) -> Result<DatabaseStats> {
        self.with(DatabaseStats::from_state)
    }

    pub fn description(&self) -> String {
        let location = match &self.inner.path {
            Some(path) => path.display().to_string(),
            None => "in-memory".to_string(),
        };
        match self.state() {
            Ok(state) => format!("Database({}, revision={}, docs={})", location, state.revision, state.doc_count()),
            Err(_) => format!("Database({}, closed)", location),
        }
    }
}

fn closed() -> Error {
    Error::new(ErrorKind::InvalidState, "Database has been closed")
}

/// Writes `state` under a new identity as the only checkpoint of a new database.
pub(crate) fn compact_into(state: &IndexState, dest: &Path, config: &Config) -> Result<()> {
    let layout = StorageLayout::create(dest)?;
    if layout.checkpoint_path().exists() || !layout.wal_files()?.is_empty() {
        return Err(Error::invalid_argument(format!(
            "Compaction target {} already holds a database",
            dest.display()
        )));
    }

    let mut copy = state.clone();
    copy.uuid = Uuid::new_v4();
    Checkpoint::save(&copy, &layout, config.compression, config.sync_mode)?;
    info!(dest = %dest.display(), revision = copy.revision, docs = copy.doc_count(), "compacted database");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::writable_database::WritableDatabase;

    fn writer_with(texts: &[&str]) -> WritableDatabase {
        let mut db = WritableDatabase::in_memory();
        for text in texts {
            let mut doc = Document::new();
            doc.set_data(*text);
            for (i, word) in text.split(' ').enumerate() {
                doc.add_posting(word, i as u32 + 1, 1).unwrap();
            }
            db.add_document(doc).unwrap();
        }
        db.commit().unwrap();
        db
    }

    #[test]
    fn reader_is_pinned_until_reopen() {
        let mut writer = writer_with(&["red fox"]);
        let reader = writer.reader();
        assert_eq!(reader.doccount().unwrap(), 1);

        writer.add_document(Document::new()).unwrap();
        writer.commit().unwrap();
        assert_eq!(reader.doccount().unwrap(), 1);

        assert!(reader.reopen().unwrap());
        assert_eq!(reader.doccount().unwrap(), 2);
        assert!(!reader.reopen().unwrap());
    }

    #[test]
    fn closed_database_rejects_calls() {
        let writer = writer_with(&["red fox"]);
        let reader = writer.reader();
        let clone = reader.clone();
        reader.close();
        assert_eq!(clone.doccount().unwrap_err().kind, ErrorKind::InvalidState);
        assert_eq!(reader.reopen().unwrap_err().kind, ErrorKind::InvalidState);
        assert!(reader.description().contains("closed"));
    }

    #[test]
    fn locked_follows_writer_lifetime() {
        let writer = writer_with(&["red fox"]);
        let reader = writer.reader();
        assert!(reader.locked().unwrap());
        drop(writer);
        assert!(!reader.locked().unwrap());
        assert!(!reader.reopen().unwrap());
        assert_eq!(reader.doccount().unwrap(), 1);
    }

    #[test]
    fn statistics_and_lookups() {
        let writer = writer_with(&["the quick fox", "the slow fox runs"]);
        let reader = writer.reader();
        assert_eq!(reader.lastdocid().unwrap(), DocId(2));
        assert_eq!(reader.total_length().unwrap(), 7);
        assert_eq!(reader.avlength().unwrap(), 3.5);
        assert_eq!(reader.termfreq("fox").unwrap(), 2);
        assert_eq!(reader.collection_freq("the").unwrap(), 2);
        assert!(!reader.term_exists("cat").unwrap());
        assert_eq!(reader.doclength(DocId(2)).unwrap(), 4);
        assert_eq!(reader.get_document(DocId(1)).unwrap().get_data(), "the quick fox");
        assert_eq!(reader.get_document(DocId(7)).unwrap_err().kind, ErrorKind::NotFound);
        assert_eq!(reader.positionlist(DocId(2), "runs").unwrap(), vec![4]);
        assert!(reader.has_positions().unwrap());
        assert_eq!(reader.get_metadata("missing").unwrap(), "");

        let terms: Vec<String> = reader.allterms("").unwrap().map(|e| e.term).collect();
        assert_eq!(terms, vec!["fox", "quick", "runs", "slow", "the"]);
    }

    #[test]
    fn compact_copies_committed_state() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer_with(&["red fox", "blue fox"]);
        let reader = writer.reader();
        reader.compact(dir.path().join("copy")).unwrap();

        let copy = Database::open(dir.path().join("copy")).unwrap();
        assert_eq!(copy.doccount().unwrap(), 2);
        assert_eq!(copy.termfreq("fox").unwrap(), 2);
        assert_ne!(copy.get_uuid().unwrap(), reader.get_uuid().unwrap());

        let err = reader.compact(dir.path().join("copy")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn open_missing_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Database::open(dir.path().join("nothing")).err().map(|e| e.kind);
        assert_eq!(err, Some(ErrorKind::NotFound));
    }
}

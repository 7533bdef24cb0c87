use std::fs::{self, File};
use std::io;
use chrono::{DateTime, Utc};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;
use crate::compression::compress::{CompressedBlock, CompressionType};
use crate::core::error::{Error, ErrorKind, Result};
use crate::index::state::IndexState;
use crate::storage::backend::{FileBackend, MemoryBackend, StorageBackend};
use crate::storage::layout::StorageLayout;
use crate::storage::wal::{SyncMode, WALEntry, WAL};

const MAGIC: &[u8; 8] = b"TSRCKPT\0";
const FORMAT_VERSION: u32 = 1;
const PREAMBLE: usize = 12;
/// Reader loads retried when a concurrent checkpoint gets in the way.
const LOAD_ATTEMPTS: u32 = 3;

/// Full image of the index at one revision.
#[derive(Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub revision: u64,
    pub timestamp: DateTime<Utc>,
    pub uuid: Uuid,
    pub doc_count: u64,
    pub checksum: u32,          // CRC32 of block.data
    pub block: CompressedBlock,
}

impl Checkpoint {
    pub fn build(state: &IndexState, compression: CompressionType) -> Result<Self> {
        let raw = bincode::serialize(state)?;
        let block = CompressedBlock::compress(&raw, compression)?;
        Ok(Checkpoint {
            revision: state.revision,
            timestamp: Utc::now(),
            uuid: state.uuid,
            doc_count: state.doc_count(),
            checksum: crc32fast::hash(&block.data),
            block,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)?;
        let mut out = Vec::with_capacity(PREAMBLE + body.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PREAMBLE || &bytes[..8] != MAGIC {
            return Err(Error::corruption("Checkpoint has bad magic"));
        }
        let version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        if version != FORMAT_VERSION {
            return Err(Error::corruption(format!("Unsupported checkpoint version {}", version)));
        }
        let checkpoint: Checkpoint = bincode::deserialize(&bytes[PREAMBLE..])
            .map_err(|e| Error::corruption(format!("Checkpoint header: {}", e)))?;
        if crc32fast::hash(&checkpoint.block.data) != checkpoint.checksum {
            return Err(Error::corruption("Checkpoint checksum mismatch"));
        }
        Ok(checkpoint)
    }

    pub fn into_state(self) -> Result<IndexState> {
        let raw = self.block.decompress()?;
        let mut state: IndexState = bincode::deserialize(&raw)
            .map_err(|e| Error::corruption(format!("Checkpoint body: {}", e)))?;
        state.rebuild();
        Ok(state)
    }

    /// Load checkpoint from disk
    pub fn load(storage: &StorageLayout) -> Result<Option<IndexState>> {
        let path = storage.checkpoint_path();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if file.metadata()?.len() == 0 {
            return Err(Error::corruption("Checkpoint file is empty"));
        }

        // SAFETY: checkpoints are only ever replaced by rename, never modified in place
        let map = unsafe { Mmap::map(&file)? };
        let checkpoint = Self::decode(&map)?;
        debug!(revision = checkpoint.revision, docs = checkpoint.doc_count, "loaded checkpoint");
        checkpoint.into_state().map(Some)
    }

    /// Writes atomically: temp file, fsync, rename.
    pub fn save(state: &IndexState, storage: &StorageLayout, compression: CompressionType, sync_mode: SyncMode) -> Result<()> {
        let bytes = Self::build(state, compression)?.encode()?;
        let tmp = storage.checkpoint_tmp_path();
        {
            let backend = FileBackend::open(&tmp)?;
            backend.truncate(0)?;
            backend.write_block(0, &bytes)?;
            if sync_mode != SyncMode::None {
                backend.fsync()?;
            }
        }
        fs::rename(&tmp, storage.checkpoint_path())?;
        if sync_mode == SyncMode::Immediate {
            storage.sync_dir(&storage.meta_dir)?;
        }
        info!(revision = state.revision, bytes = bytes.len(), "checkpoint written");
        Ok(())
    }
}

/// Rebuilds committed state from the checkpoint plus WAL.
pub struct RecoveryManager {
    pub storage: StorageLayout,
    pub sync_mode: SyncMode,
}

impl RecoveryManager {
    pub fn new(storage: StorageLayout, sync_mode: SyncMode) -> Self {
        RecoveryManager { storage, sync_mode }
    }

    /// Recovery for the writer: torn tails are truncated, stale logs removed,
    /// and the newest log is returned open for appending.
    pub fn recover(&self) -> Result<(IndexState, WAL)> {
        let mut state = Checkpoint::load(&self.storage)?.unwrap_or_default();
        let checkpoint_revision = state.revision;
        let files = self.storage.wal_files()?;

        let mut active = None;
        for (i, base) in files.iter().enumerate() {
            let backend = FileBackend::open(self.storage.wal_path(*base))?;
            let (wal, entries) = WAL::open(Box::new(backend), self.sync_mode)?;
            let replayed = Self::replay(&mut state, entries)?;
            if replayed > 0 {
                info!(wal = base, replayed, revision = state.revision, "replayed WAL");
            }
            if i + 1 == files.len() {
                active = Some(wal);
            }
        }

        for base in files.iter().filter(|base| **base < checkpoint_revision) {
            if files.last() != Some(base) {
                debug!(wal = base, "removing WAL covered by checkpoint");
                fs::remove_file(self.storage.wal_path(*base))?;
            }
        }

        let wal = match active {
            Some(wal) => wal,
            None => {
                let backend = FileBackend::open(self.storage.wal_path(state.revision))?;
                WAL::open(Box::new(backend), self.sync_mode)?.0
            }
        };
        Ok((state, wal))
    }

    /// Read-only recovery for readers. Nothing on disk is touched; a torn
    /// tail may be a commit still in flight and is simply not visible yet.
    pub fn load_committed(&self) -> Result<IndexState> {
        for attempt in 1..=LOAD_ATTEMPTS {
            let state = Checkpoint::load(&self.storage)?.unwrap_or_default();
            match self.replay_logs(state) {
                Ok(Some(state)) => return Ok(state),
                Ok(None) => warn!(attempt, "checkpoint advanced during load, retrying"),
                // A checkpoint can retire a log between listing and reading it
                Err(e) if e.kind == ErrorKind::NotFound => warn!(attempt, "WAL rotated during load, retrying"),
                Err(e) => return Err(e),
            }
        }
        Err(Error::not_found("database kept rotating its WAL during load"))
    }

    /// Replays every log on top of `state`. `None` means a newer checkpoint
    /// replaced the one `state` came from, so the logs no longer follow on.
    fn replay_logs(&self, mut state: IndexState) -> Result<Option<IndexState>> {
        let loaded = state.revision;
        for base in self.storage.wal_files()? {
            let bytes = match fs::read(self.storage.wal_path(base)) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(Error::not_found(format!("WAL {} disappeared", base)));
                }
                Err(e) => return Err(e.into()),
            };
            let backend = MemoryBackend::from_bytes(bytes);
            let scan = WAL::scan(&backend)?;
            if let Err(e) = Self::replay(&mut state, scan.entries) {
                if e.kind == ErrorKind::Corruption && self.checkpoint_newer_than(loaded)? {
                    return Ok(None);
                }
                return Err(e);
            }
        }
        Ok(Some(state))
    }

    fn checkpoint_newer_than(&self, revision: u64) -> Result<bool> {
        Ok(Checkpoint::load(&self.storage)?.is_some_and(|state| state.revision > revision))
    }

    /// Applies entries newer than `state.revision`, which must be contiguous.
    fn replay(state: &mut IndexState, entries: Vec<WALEntry>) -> Result<usize> {
        let mut replayed = 0;
        for entry in entries {
            if entry.revision <= state.revision {
                continue;
            }
            if entry.revision != state.revision + 1 {
                return Err(Error::corruption(format!(
                    "WAL jumps from revision {} to {}",
                    state.revision, entry.revision
                )));
            }
            for change in &entry.changes {
                state.apply(change)?;
            }
            state.revision = entry.revision;
            replayed += 1;
        }
        Ok(replayed)
    }

    /// Starts a fresh log after a checkpoint at `revision` and retires older ones.
    pub fn rotate(&self, revision: u64) -> Result<WAL> {
        let backend = FileBackend::open(self.storage.wal_path(revision))?;
        let (wal, _) = WAL::open(Box::new(backend), self.sync_mode)?;
        if self.sync_mode == SyncMode::Immediate {
            self.storage.sync_dir(&self.storage.wal_dir)?;
        }
        for base in self.storage.wal_files()? {
            if base < revision {
                fs::remove_file(self.storage.wal_path(base))?;
            }
        }
        debug!(revision, "rotated WAL");
        Ok(wal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::Document;
    use crate::core::types::DocId;
    use crate::writer::batch::Change;

    fn state_with_docs(n: u32) -> IndexState {
        let mut state = IndexState::new();
        for id in 1..=n {
            let mut doc = Document::new();
            doc.add_posting("word", 1, 1).unwrap();
            doc.set_data(format!("doc {}", id));
            state.replace_document(DocId(id), doc);
        }
        state.revision = n as u64;
        state
    }

    #[test]
    fn save_then_load_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::create(dir.path()).unwrap();
        let state = state_with_docs(3);

        Checkpoint::save(&state, &layout, CompressionType::Zstd, SyncMode::Batch).unwrap();
        let loaded = Checkpoint::load(&layout).unwrap().unwrap();
        assert_eq!(loaded.revision, 3);
        assert_eq!(loaded.uuid, state.uuid);
        assert_eq!(loaded.doc_count(), 3);
        assert_eq!(loaded.store.live().len(), 3);
        assert_eq!(loaded.dictionary.term_statistics("word").doc_freq, 3);
    }

    #[test]
    fn flipped_byte_is_corruption() {
        let state = state_with_docs(2);
        let mut bytes = Checkpoint::build(&state, CompressionType::LZ4).unwrap().encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x55;
        assert_eq!(Checkpoint::decode(&bytes).unwrap_err().kind, ErrorKind::Corruption);
        assert_eq!(Checkpoint::decode(b"garbage").unwrap_err().kind, ErrorKind::Corruption);
    }

    #[test]
    fn recovery_replays_wal_after_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::create(dir.path()).unwrap();
        let manager = RecoveryManager::new(layout.clone(), SyncMode::Batch);

        let (state, mut wal) = manager.recover().unwrap();
        assert_eq!(state.revision, 0);
        let mut doc = Document::new();
        doc.add_term("fox", 1).unwrap();
        wal.append(&WALEntry {
            revision: 1,
            timestamp: Utc::now(),
            changes: vec![Change::AddDocument { id: DocId(1), doc }],
        })
        .unwrap();
        drop(wal);

        let reader_view = manager.load_committed().unwrap();
        assert_eq!(reader_view.revision, 1);

        let (state, _wal) = manager.recover().unwrap();
        assert_eq!(state.revision, 1);
        assert!(state.dictionary.contains("fox"));
    }

    #[test]
    fn stale_checkpoint_view_is_retried_not_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::create(dir.path()).unwrap();
        let manager = RecoveryManager::new(layout.clone(), SyncMode::None);
        let (_state, _wal) = manager.recover().unwrap();

        // Writer checkpoints at 5, rotates, and commits 6 after a reader
        // has already loaded the checkpoint at 2.
        Checkpoint::save(&state_with_docs(5), &layout, CompressionType::None, SyncMode::None).unwrap();
        let mut wal = manager.rotate(5).unwrap();
        let mut doc = Document::new();
        doc.add_term("word", 1).unwrap();
        wal.append(&WALEntry {
            revision: 6,
            timestamp: Utc::now(),
            changes: vec![Change::AddDocument { id: DocId(6), doc }],
        })
        .unwrap();

        assert!(manager.replay_logs(state_with_docs(2)).unwrap().is_none());
        let state = manager.load_committed().unwrap();
        assert_eq!(state.revision, 6);
        assert_eq!(state.doc_count(), 6);
    }

    #[test]
    fn missing_log_behind_stable_checkpoint_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::create(dir.path()).unwrap();
        let manager = RecoveryManager::new(layout.clone(), SyncMode::None);
        Checkpoint::save(&state_with_docs(2), &layout, CompressionType::None, SyncMode::None).unwrap();

        let backend = FileBackend::open(layout.wal_path(5)).unwrap();
        let (mut wal, _) = WAL::open(Box::new(backend), SyncMode::None).unwrap();
        wal.append(&WALEntry { revision: 6, timestamp: Utc::now(), changes: Vec::new() }).unwrap();

        assert_eq!(manager.load_committed().unwrap_err().kind, ErrorKind::Corruption);
    }

    #[test]
    fn rotate_retires_old_logs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::create(dir.path()).unwrap();
        let manager = RecoveryManager::new(layout.clone(), SyncMode::None);
        let (_state, _wal) = manager.recover().unwrap();
        assert_eq!(layout.wal_files().unwrap(), vec![0]);

        let _wal = manager.rotate(5).unwrap();
        assert_eq!(layout.wal_files().unwrap(), vec![5]);
    }
}

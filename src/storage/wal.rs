use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::core::error::{Error, Result};
use crate::storage::backend::StorageBackend;
use crate::writer::batch::Change;

/// Frame header: payload length then CRC32 of the payload, both little endian.
const FRAME_HEADER: usize = 8;
const MAX_ENTRY_SIZE: usize = 256 * 1024 * 1024;

/// Write-ahead log for durability
pub struct WAL {
    pub backend: Box<dyn StorageBackend>,
    pub position: u64,
    pub sync_mode: SyncMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    Immediate,  // fsync every commit, and the directory on checkpoint
    Batch,      // fsync every commit
    None,       // Let OS handle it
}

/// One committed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WALEntry {
    pub revision: u64,
    pub timestamp: DateTime<Utc>,
    pub changes: Vec<Change>,
}

/// Result of scanning a log.
#[derive(Debug)]
pub struct WalScan {
    pub entries: Vec<WALEntry>,
    pub valid_len: u64,
    pub torn_tail: bool,
}

impl WalScan {
    fn torn(entries: Vec<WALEntry>, offset: usize) -> Self {
        WalScan { entries, valid_len: offset as u64, torn_tail: true }
    }
}

impl WAL {
    /// Opens a log, dropping any torn record at its tail.
    pub fn open(backend: Box<dyn StorageBackend>, sync_mode: SyncMode) -> Result<(Self, Vec<WALEntry>)> {
        let scan = Self::scan(backend.as_ref())?;
        if scan.torn_tail {
            warn!(valid_len = scan.valid_len, "discarding torn record at end of WAL");
            backend.truncate(scan.valid_len)?;
            backend.fsync()?;
        }

        let wal = WAL {
            backend,
            position: scan.valid_len,
            sync_mode,
        };
        Ok((wal, scan.entries))
    }

    /// Appends one framed entry; durable on return unless sync is off.
    pub fn append(&mut self, entry: &WALEntry) -> Result<()> {
        let data = bincode::serialize(entry)?;
        if data.len() > MAX_ENTRY_SIZE {
            return Err(Error::invalid_argument(format!(
                "Commit of {} bytes exceeds WAL entry limit", data.len()
            )));
        }

        let mut frame = Vec::with_capacity(FRAME_HEADER + data.len());
        frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&data).to_le_bytes());
        frame.extend_from_slice(&data);

        if let Err(e) = self.backend.write_block(self.position, &frame) {
            // Leave no partial frame behind
            let _ = self.backend.truncate(self.position);
            return Err(e);
        }

        match self.sync_mode {
            SyncMode::Immediate | SyncMode::Batch => {
                if let Err(e) = self.backend.fsync() {
                    let _ = self.backend.truncate(self.position);
                    return Err(e);
                }
            }
            SyncMode::None => {}
        }

        self.position += frame.len() as u64;
        debug!(revision = entry.revision, bytes = frame.len(), "WAL append");
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.backend.fsync()
    }

    pub fn size(&self) -> u64 {
        self.position
    }

    /// Reads every complete entry.
    ///
    /// An incomplete or checksum-failing final frame is a torn write and is
    /// reported, not returned. A bad frame followed by more data is corruption.
    pub fn scan(backend: &dyn StorageBackend) -> Result<WalScan> {
        let bytes = backend.read_all()?;
        let mut entries = Vec::new();
        let mut offset = 0usize;

        while offset < bytes.len() {
            if bytes.len() - offset < FRAME_HEADER {
                return Ok(WalScan::torn(entries, offset));
            }
            let len = u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]) as usize;
            let crc = u32::from_le_bytes([bytes[offset + 4], bytes[offset + 5], bytes[offset + 6], bytes[offset + 7]]);
            let start = offset + FRAME_HEADER;

            if len > MAX_ENTRY_SIZE || bytes.len() - start < len {
                return Ok(WalScan::torn(entries, offset));
            }
            let end = start + len;
            let payload = &bytes[start..end];

            if crc32fast::hash(payload) != crc {
                if end == bytes.len() {
                    return Ok(WalScan::torn(entries, offset));
                }
                return Err(Error::corruption(format!("WAL checksum mismatch at offset {}", offset)));
            }

            let entry: WALEntry = bincode::deserialize(payload)
                .map_err(|e| Error::corruption(format!("WAL entry at offset {}: {}", offset, e)))?;
            entries.push(entry);
            offset = end;
        }

        Ok(WalScan { entries, valid_len: offset as u64, torn_tail: false })
    }
}

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use parking_lot::Mutex;
use crate::core::error::{Error, Result};

/// Byte-addressed storage the WAL and checkpoints are written through.
pub trait StorageBackend: Send + Sync {
    fn read_block(&self, offset: u64, len: usize) -> Result<Vec<u8>>;

    fn write_block(&self, offset: u64, bytes: &[u8]) -> Result<()>;

    fn fsync(&self) -> Result<()>;

    fn len(&self) -> Result<u64>;

    fn truncate(&self, len: u64) -> Result<()>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Writes at the current end, returning the offset written at.
    fn append(&self, bytes: &[u8]) -> Result<u64> {
        let offset = self.len()?;
        self.write_block(offset, bytes)?;
        Ok(offset)
    }

    fn read_all(&self) -> Result<Vec<u8>> {
        let len = self.len()? as usize;
        self.read_block(0, len)
    }
}

pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;
        Ok(FileBackend { path, file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_block(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_block(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        Ok(())
    }

    fn fsync(&self) -> Result<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    fn truncate(&self, len: u64) -> Result<()> {
        self.file.lock().set_len(len)?;
        Ok(())
    }
}

/// Heap-backed storage. Clones share the same bytes.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        MemoryBackend { bytes: Arc::new(Mutex::new(bytes)) }
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }
}

impl StorageBackend for MemoryBackend {
    fn read_block(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let bytes = self.bytes.lock();
        let start = offset as usize;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| Error::new(
                crate::core::error::ErrorKind::Io,
                format!("Read of {} bytes at {} past end ({})", len, offset, bytes.len()),
            ))?;
        Ok(bytes[start..end].to_vec())
    }

    fn write_block(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.lock();
        let start = offset as usize;
        let end = start + data.len();
        if bytes.len() < end {
            bytes.resize(end, 0);
        }
        bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    fn fsync(&self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.bytes.lock().len() as u64)
    }

    fn truncate(&self, len: u64) -> Result<()> {
        self.bytes.lock().truncate(len as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(backend: &dyn StorageBackend) {
        assert!(backend.is_empty().unwrap());
        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        backend.write_block(0, b"J").unwrap();
        backend.fsync().unwrap();
        assert_eq!(backend.read_all().unwrap(), b"Jello world");
        assert_eq!(backend.read_block(6, 5).unwrap(), b"world");
        assert!(backend.read_block(8, 10).is_err());
        backend.truncate(5).unwrap();
        assert_eq!(backend.len().unwrap(), 5);
    }

    #[test]
    fn memory_backend_contract() {
        exercise(&MemoryBackend::new());
    }

    #[test]
    fn file_backend_contract() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FileBackend::open(dir.path().join("blocks")).unwrap());
    }
}

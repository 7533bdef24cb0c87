use std::path::{Path, PathBuf};
use std::fs;
use crate::core::error::{Error, Result};

/// Directory structure for data files
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,      // Root directory
    pub wal_dir: PathBuf,       // Write-ahead log location
    pub meta_dir: PathBuf,      // Checkpoint files location
}

impl StorageLayout {
    fn paths(base_dir: &Path) -> Self {
        StorageLayout {
            base_dir: base_dir.to_path_buf(),
            wal_dir: base_dir.join("wal"),
            meta_dir: base_dir.join("meta"),
        }
    }

    /// Creates the directory tree if needed.
    pub fn create(base_dir: impl AsRef<Path>) -> Result<Self> {
        let layout = Self::paths(base_dir.as_ref());
        fs::create_dir_all(&layout.wal_dir)?;
        fs::create_dir_all(&layout.meta_dir)?;
        Ok(layout)
    }

    /// Opens an existing database directory without creating anything.
    pub fn existing(base_dir: impl AsRef<Path>) -> Result<Self> {
        let layout = Self::paths(base_dir.as_ref());
        if !layout.exists() {
            return Err(Error::not_found(format!(
                "No database at {}",
                layout.base_dir.display()
            )));
        }
        Ok(layout)
    }

    pub fn exists(&self) -> bool {
        self.wal_dir.is_dir() && self.meta_dir.is_dir()
    }

    /// Removes WAL and checkpoint files, leaving the lock file alone.
    pub fn clear(&self) -> Result<()> {
        for dir in [&self.wal_dir, &self.meta_dir] {
            if dir.exists() {
                fs::remove_dir_all(dir)?;
            }
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// WAL holding commits made after revision `base_revision`.
    pub fn wal_path(&self, base_revision: u64) -> PathBuf {
        self.wal_dir.join(format!("wal_{:08}.log", base_revision))
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.meta_dir.join("checkpoint.bin")
    }

    pub fn checkpoint_tmp_path(&self) -> PathBuf {
        self.meta_dir.join("checkpoint.tmp")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(".lock")
    }

    pub fn wal_dir(&self) -> &PathBuf {
        &self.wal_dir
    }

    /// Base revisions of every WAL file present, ascending.
    pub fn wal_files(&self) -> Result<Vec<u64>> {
        let mut revisions = Vec::new();
        if !self.wal_dir.exists() {
            return Ok(revisions);
        }

        for entry in fs::read_dir(&self.wal_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("log") {
                continue;
            }
            let revision = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix("wal_"))
                .and_then(|s| s.parse::<u64>().ok());
            if let Some(revision) = revision {
                revisions.push(revision);
            }
        }

        revisions.sort_unstable();
        Ok(revisions)
    }

    /// Flushes directory entries so renames and new files survive a crash.
    pub fn sync_dir(&self, dir: &Path) -> Result<()> {
        #[cfg(unix)]
        fs::File::open(dir)?.sync_all()?;
        #[cfg(not(unix))]
        let _ = dir;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wal_files_are_sorted_by_revision() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::create(dir.path()).unwrap();
        for rev in [20, 3, 7] {
            fs::write(layout.wal_path(rev), b"").unwrap();
        }
        fs::write(layout.wal_dir.join("notes.txt"), b"").unwrap();
        assert_eq!(layout.wal_files().unwrap(), vec![3, 7, 20]);
    }

    #[test]
    fn existing_requires_a_database() {
        let dir = tempfile::tempdir().unwrap();
        let err = StorageLayout::existing(dir.path()).unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::NotFound);
        StorageLayout::create(dir.path()).unwrap();
        assert!(StorageLayout::existing(dir.path()).is_ok());
    }
}

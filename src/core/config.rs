use std::path::Path;
use serde::{Serialize, Deserialize};
use crate::compression::compress::CompressionType;
use crate::core::error::Result;
use crate::storage::wal::SyncMode;

/// How `WritableDatabase::open` treats an existing or missing directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenMode {
    CreateOrOpen,       // DB_CREATE_OR_OPEN
    Create,             // DB_CREATE: fail if a database already exists
    CreateOrOverwrite,  // DB_CREATE_OR_OVERWRITE: discard any existing data
    Open,               // DB_OPEN: fail if no database exists
}

pub const DB_CREATE_OR_OPEN: OpenMode = OpenMode::CreateOrOpen;
pub const DB_CREATE: OpenMode = OpenMode::Create;
pub const DB_CREATE_OR_OVERWRITE: OpenMode = OpenMode::CreateOrOverwrite;
pub const DB_OPEN: OpenMode = OpenMode::Open;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync_mode: SyncMode,

    // Write a full checkpoint and rotate the WAL after this many commits
    pub checkpoint_interval: u32,
    // ... or once the WAL grows past this size
    pub wal_max_bytes: u64,
    pub compression: CompressionType,

    // DB_RETRY_LOCK: retry the writer lock instead of failing at once
    pub lock_retry_attempts: u32,
    pub lock_retry_interval_ms: u64,

    // Wildcard terms a query parser may expand to; 0 means no limit
    pub max_wildcard_expansion: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sync_mode: SyncMode::Batch,
            checkpoint_interval: 16,
            wal_max_bytes: 64 * 1024 * 1024,
            compression: CompressionType::LZ4,
            lock_retry_attempts: 0,
            lock_retry_interval_ms: 50,
            max_wildcard_expansion: 0,
        }
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// DB_NO_SYNC
    pub fn no_sync(mut self) -> Self {
        self.sync_mode = SyncMode::None;
        self
    }

    /// DB_FULL_SYNC
    pub fn full_sync(mut self) -> Self {
        self.sync_mode = SyncMode::Immediate;
        self
    }

    /// DB_RETRY_LOCK
    pub fn retry_lock(mut self, attempts: u32) -> Self {
        self.lock_retry_attempts = attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = Config::from_json_str(r#"{ "checkpoint_interval": 3 }"#).unwrap();
        assert_eq!(config.checkpoint_interval, 3);
        assert_eq!(config.lock_retry_attempts, 0);
        assert!(matches!(config.compression, CompressionType::LZ4));
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = Config::from_json_str("{ nope").unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::Serialization);
    }
}

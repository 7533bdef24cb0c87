pub mod backend;
pub mod checkpoint;
pub mod file_lock;
pub mod layout;
pub mod wal;

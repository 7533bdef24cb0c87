use std::fs::{File, OpenOptions};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::layout::StorageLayout;

/// Single writer guarantee
pub struct FileLock {
    pub file: File,
}

impl FileLock {
    /// Takes the exclusive writer lock, retrying `attempts` extra times.
    pub fn acquire(storage: &StorageLayout, attempts: u32, interval: Duration) -> Result<Self> {
        let mut tries = 0;
        loop {
            match Self::try_acquire(storage) {
                Err(e) if e.kind == ErrorKind::ConcurrentWrite && tries < attempts => {
                    tries += 1;
                    debug!(attempt = tries, "writer lock busy, retrying");
                    thread::sleep(interval);
                }
                Err(e) => {
                    if e.kind == ErrorKind::ConcurrentWrite {
                        warn!(path = %storage.base_dir.display(), "database is locked by another writer");
                    }
                    return Err(e);
                }
                ok => return ok,
            }
        }
    }

    fn try_acquire(storage: &StorageLayout) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(storage.lock_path())?;

        // Platform-specific locking
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            use libc::{flock, LOCK_EX, LOCK_NB};

            let fd = file.as_raw_fd();
            unsafe {
                if flock(fd, LOCK_EX | LOCK_NB) != 0 {
                    let err = std::io::Error::last_os_error();
                    return Err(match err.raw_os_error() {
                        Some(libc::EWOULDBLOCK) => Error::new(
                            ErrorKind::ConcurrentWrite,
                            format!("Unable to get write lock on {}: already locked", storage.base_dir.display()),
                        ),
                        _ => Error::from(err),
                    });
                }
            }
        }

        Ok(FileLock { file })
    }

    /// Whether some writer currently holds the lock.
    pub fn is_locked(storage: &StorageLayout) -> Result<bool> {
        if !storage.lock_path().exists() {
            return Ok(false);
        }
        match Self::try_acquire(storage) {
            Ok(_released_on_drop) => Ok(false),
            Err(e) if e.kind == ErrorKind::ConcurrentWrite => Ok(true),
            Err(e) => Err(e),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            use libc::{flock, LOCK_UN};

            let fd = self.file.as_raw_fd();
            unsafe {
                flock(fd, LOCK_UN);
            }
        }
    }
}

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use crate::index::state::IndexState;

/// Snapshot of index at a point in time
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: u64,
    pub state: Arc<IndexState>,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(state: Arc<IndexState>) -> Self {
        Snapshot {
            version: state.revision,
            state,
            timestamp: Utc::now(),
        }
    }
}

/// Publishes committed states to readers.
///
/// Readers clone the current `Arc<Snapshot>` and never block the writer;
/// an old snapshot stays alive for as long as some reader holds it.
pub struct MVCCController {
    current: RwLock<Arc<Snapshot>>,
    current_version: AtomicU64,
}

impl MVCCController {
    pub fn new(state: Arc<IndexState>) -> Self {
        let snapshot = Arc::new(Snapshot::new(state));
        MVCCController {
            current_version: AtomicU64::new(snapshot.version),
            current: RwLock::new(snapshot),
        }
    }

    pub fn publish(&self, state: Arc<IndexState>) -> Arc<Snapshot> {
        let snapshot = Arc::new(Snapshot::new(state));
        let mut current = self.current.write();
        *current = Arc::clone(&snapshot);
        self.current_version.store(snapshot.version, Ordering::Release);
        snapshot
    }

    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Cheap check for "has anything been committed since `version`".
    pub fn current_version(&self) -> u64 {
        self.current_version.load(Ordering::Acquire)
    }
}

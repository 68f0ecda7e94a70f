//! Generic lazily-created, process-wide keyed mutex map.
//!
//! Backs both the per-project admission lock (spec §4.1, §9) and the
//! per-operation finalize lock bookkeeping uses to guarantee the
//! single-terminal invariant (spec §4.3, §9). Entries are never reclaimed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;

pub type KeyedGuard = tokio::sync::OwnedMutexGuard<()>;

#[derive(Default)]
pub struct KeyedLocks {
    locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> KeyedGuard {
        let mutex = {
            let mut locks = self.locks.lock();
            Arc::clone(
                locks
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        mutex.lock_owned().await
    }

    pub fn known_keys(&self) -> usize {
        self.locks.lock().len()
    }
}

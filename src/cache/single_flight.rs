//! Per-key download serialization.
//!
//! A process-wide map from cache key to a per-key async mutex. Holding the
//! key's mutex guards the verify-cache → fetch → install critical section,
//! so at most one download is in flight per key. Entries are created on
//! first use and retained for the life of the process; the namespace of
//! package file names grows slowly enough that this is acceptable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

/// Registry of per-key download locks.
#[derive(Debug, Default)]
pub struct DownloadLocks {
    // The outer lock is held only to look up or insert an entry, never
    // across an await point.
    inner: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DownloadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the lock for `key`, creating it on first use. The returned
    /// mutex is acquired by the caller, outside the registry lock.
    pub fn acquire(&self, key: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().expect("download lock registry poisoned");
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

use std::sync::Arc;

use ahash::AHashMap as HashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

/// Process-wide registry of per-collection write locks.
///
/// Each batch item is applied under exactly one [`WriteScope`] acquired
/// from here, scoped to that single item. The scope is released before
/// the transient-fault retry point, the write-concern wait, and the
/// partition-map refresh, so unrelated writers can interleave between
/// items of the same batch.
pub struct CollectionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Default for CollectionLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionLocks {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Blocks until the collection's exclusive write scope is available
    /// and returns the held guard.
    pub fn acquire(&self, namespace: &str) -> WriteScope {
        let lock = {
            let mut locks = self.locks.lock();
            // Entries no scope currently holds are dropped, so the map
            // is bounded by the number of concurrently written
            // collections, not every namespace ever touched.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                locks
                    .entry(namespace.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        WriteScope {
            guard: Mutex::lock_arc(&lock),
        }
    }

    #[cfg(test)]
    fn tracked_collections(&self) -> usize {
        self.locks.lock().len()
    }
}

/// An exclusive write acquisition on one collection, held for the
/// duration of a single item's application. Dropping the scope releases
/// the collection to contending writers.
pub struct WriteScope {
    #[allow(dead_code)]
    guard: ArcMutexGuard<RawMutex, ()>,
}

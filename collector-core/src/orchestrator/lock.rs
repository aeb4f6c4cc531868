//! Per-collector exclusive run lock (§5: "at most one run per collector at
//! any time"). Grounded loosely on `ferrex-core`'s scheduler/lease state
//! tracking, simplified to a single in-process active-set since a
//! collector run never spans processes.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::CollectorId;

#[derive(Default)]
pub struct RunLockRegistry {
    active: Mutex<HashSet<CollectorId>>,
}

/// Held for the duration of a run; releases the collector on drop so a
/// panicking or erroring run never leaves the collector stuck locked.
pub struct RunLockGuard {
    registry: Arc<RunLockRegistry>,
    collector: CollectorId,
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        self.registry.active.lock().remove(&self.collector);
    }
}

impl RunLockRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns `Err(())` (maps to a 409 conflict at the orchestrator
    /// boundary) when a run is already in progress for `collector`.
    pub fn acquire(self: &Arc<Self>, collector: &CollectorId) -> Result<RunLockGuard, ()> {
        let mut active = self.active.lock();
        if !active.insert(collector.clone()) {
            return Err(());
        }
        Ok(RunLockGuard {
            registry: self.clone(),
            collector: collector.clone(),
        })
    }
}

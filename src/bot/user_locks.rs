//! Per-user serialization of dialogue turns.
//!
//! Each inbound message runs in its own task. Tasks for the same user take
//! that user's lock for the whole turn, so position and offset updates never
//! interleave; different users proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Registry size above which idle locks are dropped
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug)]
struct Registry {
    locks: HashMap<i64, Arc<AsyncMutex<()>>>,
    /// Size that triggers the next prune
    prune_at: usize,
}

#[derive(Debug)]
pub struct UserLocks {
    registry: Mutex<Registry>,
    threshold: usize,
}

impl Default for UserLocks {
    fn default() -> Self {
        Self::with_prune_threshold(PRUNE_THRESHOLD)
    }
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prune_threshold(threshold: usize) -> Self {
        Self {
            registry: Mutex::new(Registry {
                locks: HashMap::new(),
                prune_at: threshold,
            }),
            threshold,
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for exclusive access to `user_id`'s dialogue
    pub async fn acquire(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut registry = self.registry();
            if registry.locks.len() > registry.prune_at {
                // Only the registry holds idle locks
                registry.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
                // Next scan once the map has doubled past the busy entries
                registry.prune_at = self.threshold.max(registry.locks.len() * 2);
                debug!(
                    remaining = registry.locks.len(),
                    next_prune_at = registry.prune_at,
                    "Pruned idle user locks"
                );
            }
            Arc::clone(registry.locks.entry(user_id).or_default())
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.registry().locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Per-pantry serialization of mutating operations.
//!
//! Every write against one pantry (membership, votes, inventory, activity)
//! holds that pantry's guard for the duration of its transaction. Distinct
//! pantries never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Idle entries are dropped once the registry grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Default)]
pub struct PantryLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

pub type PantryGuard = OwnedMutexGuard<()>;

impl PantryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `pantry_name`.
    pub async fn acquire(&self, pantry_name: &str) -> PantryGuard {
        let key = pantry_name.trim().to_string();
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if map.len() > PRUNE_THRESHOLD {
                map.retain(|_, l| Arc::strong_count(l) > 1);
            }
            map.entry(key).or_default().clone()
        };
        tracing::trace!("Waiting for pantry lock '{}'", pantry_name.trim());
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }
}

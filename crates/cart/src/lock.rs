//! Keyed async mutual exclusion with bounded waiting.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// The lock for a key was not granted in time.
#[derive(Debug, Clone, Error)]
#[error("Timed out after {waited:?} waiting for lock on {key}")]
pub struct LockTimeout {
    pub key: String,
    pub waited: Duration,
}

type Slots<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

/// A set of independent async mutexes, one per key.
///
/// Holders of different keys never block each other. Slots are created on
/// first use and dropped again once nobody holds or waits for them.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Slots<K>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone + Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits up to `timeout` for the lock on `key`.
    ///
    /// Dropping the returned future before the lock is granted gives up the
    /// place in the queue without side effects.
    pub async fn acquire(&self, key: K, timeout: Duration) -> Result<KeyedGuard<K>, LockTimeout> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(key.clone()).or_default().clone()
        };

        let acquired = tokio::time::timeout(timeout, slot.lock_owned()).await;
        match acquired {
            Ok(guard) => Ok(KeyedGuard {
                key,
                guard: Some(guard),
                slots: self.slots.clone(),
            }),
            Err(_) => {
                release_slot(&self.slots, &key);
                Err(LockTimeout {
                    key: key.to_string(),
                    waited: timeout,
                })
            }
        }
    }

    /// Returns the number of keys currently held or waited for.
    pub fn active_keys(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Drops the slot for `key` if the map holds the only reference to it.
fn release_slot<K: Eq + Hash>(slots: &Slots<K>, key: &K) {
    let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
    if slots
        .get(key)
        .is_some_and(|slot| Arc::strong_count(slot) == 1)
    {
        slots.remove(key);
    }
}

/// Holds the lock on one key until dropped.
#[derive(Debug)]
pub struct KeyedGuard<K: Eq + Hash> {
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Slots<K>,
}

impl<K: Eq + Hash> KeyedGuard<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        // The owned guard keeps the slot alive, release it first.
        self.guard.take();
        release_slot(&self.slots, &self.key);
    }
}

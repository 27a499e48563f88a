//! Process-wide keyed mutexes.
//!
//! Some Okta collections (policy rules, security event providers, link
//! definitions) race or silently serialize when written concurrently. Object
//! types flagged with a mutex key take the named lock around their write
//! critical section; the lock is released when the guard drops and is never
//! held across RPCs.

use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub const POLICY_RULE: &str = "policy-rule";

/// Guard for one named lock; dropping it unlocks.
#[derive(Debug)]
pub struct KeyGuard {
    name: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        trace!("Released mutex '{}'", self.name);
    }
}

/// Registry of named async mutexes, created on first use.
#[derive(Debug, Default)]
pub struct MutexRegistry {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl MutexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other holder of `name` is active.
    ///
    /// Not reentrant: taking the same key twice within one task deadlocks.
    /// Each operation takes at most one key, and only around its own write,
    /// so no caller ever needs to re-acquire a lock it already holds.
    pub async fn lock(&self, name: &str) -> KeyGuard {
        let mutex = self.entry(name);
        trace!("Waiting for mutex '{}'", name);
        let guard = mutex.lock_owned().await;
        trace!("Acquired mutex '{}'", name);
        KeyGuard {
            name: name.to_string(),
            _guard: guard,
        }
    }

    /// Number of keys ever locked.
    pub fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

//! Per-key mutual exclusion for restore and save
//!
//! The registry only holds weak references: an entry lives as long as some
//! caller holds or waits on its lock, and is pruned on the next access after
//! that.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of async mutexes keyed by cache key
#[derive(Debug, Default)]
pub struct KeyLocks {
    entries: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        self.mutex_for(key).lock_owned().await
    }

    /// Lock every key in a stable order
    ///
    /// Keys are sorted and deduplicated so two callers locking overlapping
    /// sets cannot deadlock.
    pub async fn lock_all<I, S>(&self, keys: I) -> Vec<OwnedMutexGuard<()>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Forget unused entries below `prefix`
    ///
    /// Entries someone still holds or waits on are kept, so a later `lock`
    /// on the same key still waits for them.
    pub fn remove_job(&self, prefix: &str) {
        let prefix = prefix.trim_end_matches('/');
        let nested = format!("{}/", prefix);
        let mut entries = self.entries();
        entries.retain(|key, weak| {
            weak.strong_count() > 0 || (key != prefix && !key.starts_with(&nested))
        });
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let mut entries = self.entries();
        entries.retain(|_, weak| weak.strong_count() > 0);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mutex_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut entries = self.entries();
        entries.retain(|_, weak| weak.strong_count() > 0);

        if let Some(existing) = entries.get(key).and_then(Weak::upgrade) {
            return existing;
        }
        let mutex = Arc::new(AsyncMutex::new(()));
        entries.insert(key.to_string(), Arc::downgrade(&mutex));
        mutex
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Weak<AsyncMutex<()>>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

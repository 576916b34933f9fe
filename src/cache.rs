// src/cache.rs
//! Time-bounded in-process caches for the external fetches.
//!
//! Entries are immutable value objects: two overlapping refreshes for the
//! same key may both fetch and both write, and the last write simply wins.
//! Reads never touch the network. The wall clock is injected through
//! [`Clock`] so TTL behavior is unit-testable.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of "now" in epoch milliseconds.
pub trait Clock {
    fn now_epoch_ms(&self) -> u64;
}

/// Production clock backed by `SystemTime`.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A cached value plus the instant it was fetched.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at_epoch_ms: u64,
}

/// Process-lifetime TTL cache. An entry is fresh while
/// `now - fetched_at < ttl`; an expired entry is kept around so it can be
/// served as a stale fallback when a refresh fails.
pub struct TtlCache<K, V> {
    ttl_ms: u64,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl_ms: ttl.as_millis() as u64,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value only if it is still within its TTL.
    pub fn get_fresh(&self, key: &K, now_ms: u64) -> Option<V> {
        let entries = self.entries.lock().ok()?;
        let entry = entries.get(key)?;
        if now_ms.saturating_sub(entry.fetched_at_epoch_ms) < self.ttl_ms {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Returns the cached value regardless of age. Used as a fallback after
    /// a refresh failure.
    pub fn get_stale(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock().ok()?;
        entries.get(key).map(|e| e.value.clone())
    }

    /// Stores a value fetched at `now_ms`, replacing any previous entry.
    pub fn insert(&self, key: K, value: V, now_ms: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key,
                CacheEntry {
                    value,
                    fetched_at_epoch_ms: now_ms,
                },
            );
        }
    }
}

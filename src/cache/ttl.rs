//! Thread-safe key/value cache with a uniform time-to-live.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cached value together with the instant it stops being visible.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached payload.
    pub value: V,
    /// Absolute expiry (write time + TTL).
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    /// An entry is visible only while `now < expires_at`.
    pub fn is_live_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Breakdown of physically stored entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheSummary {
    /// Entries still visible to readers.
    pub live: usize,
    /// Entries past their expiry that have not been reclaimed yet.
    pub expired: usize,
}

/// A cache handle. Clones share the same storage.
pub struct TtlCache<V> {
    entries: Arc<DashMap<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            ttl: self.ttl,
        }
    }
}

impl<V> TtlCache<V> {
    /// Create an empty cache whose writes live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// The TTL applied to every write.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `value` under `key`, replacing any previous entry and its expiry.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.insert(key.into(), entry);
    }

    /// Remove `key` whether or not it has expired.
    ///
    /// Returns true if an entry was physically present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let live = entry.is_live_at(now);
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    /// Number of physically stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count live and expired entries.
    pub fn summary(&self) -> CacheSummary {
        let now = Instant::now();
        let mut summary = CacheSummary::default();
        for entry in self.entries.iter() {
            if entry.value().is_live_at(now) {
                summary.live += 1;
            } else {
                summary.expired += 1;
            }
        }
        summary
    }
}

impl<V: Clone> TtlCache<V> {
    /// Look up `key`.
    ///
    /// Absent and expired entries both return `None`. Never mutates the map,
    /// so concurrent readers only ever take shared shard locks.
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.is_live_at(Instant::now()) {
            Some(entry.value.clone())
        } else {
            None
        }
    }
}

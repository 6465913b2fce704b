//! Bounded, time-expiring, content-addressed result store.
//!
//! Entries expire `ttl` after their last write; the least-recently-used entry
//! is evicted when a new key would exceed `max_entries`. Expired entries are
//! dropped lazily on access and before any LRU eviction. One mutex guards the
//! whole map, so `get` and `put` are atomic with respect to each other and no
//! caller ever observes a half-written entry.

pub mod sweeper;

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::fingerprint::ContentFingerprint;
use crate::models::{AnalysisResult, Explanation};

pub use sweeper::{spawn_sweeper, Sweep};

/// Completed frame analyses keyed by frame fingerprint.
pub type ResultCache = TtlLruCache<ContentFingerprint, AnalysisResult>;

/// Successful explanations keyed by fingerprint of the explained text.
pub type ExplanationCache = TtlLruCache<ContentFingerprint, Explanation>;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(3600),
            max_entries: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub expirations: u64,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
    last_access: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Access tick -> key; the first element is the least recently used.
    recency: BTreeMap<u64, K>,
    tick: u64,
    stats: CacheStats,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn next_tick(&mut self) -> u64 {
        self.tick = self.tick.wrapping_add(1);
        self.tick
    }

    fn remove(&mut self, key: &K) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.last_access);
        Some(entry)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        self.stats.expirations += expired.len() as u64;
        expired.len()
    }

    fn evict_lru(&mut self) -> bool {
        let Some((_, key)) = self.recency.pop_first() else {
            return false;
        };
        self.entries.remove(&key);
        self.stats.evictions += 1;
        true
    }
}

pub struct TtlLruCache<K, V> {
    config: CacheConfig,
    inner: Mutex<Inner<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlLruCache<K, V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(config.max_entries.min(1024)),
                recency: BTreeMap::new(),
                tick: 0,
                stats: CacheStats::default(),
            }),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Returns the stored value if present and unexpired. Counts as an access.
    pub fn get(&self, key: &K) -> Option<V> {
        if !self.config.enabled {
            return None;
        }

        let now = Instant::now();
        let mut inner = self.lock();

        match inner.entries.get(key).map(|entry| entry.expires_at <= now) {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(true) => {
                inner.remove(key);
                inner.stats.expirations += 1;
                inner.stats.misses += 1;
                return None;
            }
            Some(false) => {}
        }

        let tick = inner.next_tick();
        let entry = inner.entries.get_mut(key)?;
        let previous = std::mem::replace(&mut entry.last_access, tick);
        let value = entry.value.clone();
        inner.recency.remove(&previous);
        inner.recency.insert(tick, key.clone());
        inner.stats.hits += 1;
        Some(value)
    }

    /// Inserts or overwrites `key`, restarting its TTL.
    pub fn put(&self, key: K, value: V) {
        if !self.config.enabled || self.config.max_entries == 0 {
            return;
        }

        let now = Instant::now();
        let mut inner = self.lock();

        let replacing = inner.remove(&key).is_some();
        if !replacing && inner.entries.len() >= self.config.max_entries {
            inner.purge_expired(now);
            while inner.entries.len() >= self.config.max_entries {
                if !inner.evict_lru() {
                    break;
                }
            }
        }

        let tick = inner.next_tick();
        inner.recency.insert(tick, key.clone());
        inner.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.config.ttl,
                last_access: tick,
            },
        );
        inner.stats.inserts += 1;
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.recency.clear();
    }

    /// Drops every expired entry now instead of waiting for access.
    pub fn purge_expired(&self) -> usize {
        self.lock().purge_expired(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        // A panic while holding the lock cannot leave a partial entry behind
        // (entries are inserted whole), so the poisoned state is still valid.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//! Fast signal lookup and caching
//!
//! Symbol-keyed store of the most recent live signal per instrument.
//! Inserts overwrite (last-write-wins, no history); expired entries are
//! swept by [`SignalCache::evict_expired`], which the owning service runs
//! on its housekeeping cadence. The map is sharded, so readers on one
//! symbol never wait out a writer on another.

use dashmap::DashMap;
use kestrel_core::CompactSignal;
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default slot count. Must be a power of two.
pub const DEFAULT_CACHE_CAPACITY: usize = 65_536;

/// Cache counters. All atomic; read individually or via [`CacheStats::hit_ratio`].
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub insertions: AtomicU64,
    pub evictions: AtomicU64,
    /// New-symbol inserts refused because the cache was full
    pub rejected_inserts: AtomicU64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Fixed-capacity cache of the most recent signal per symbol
pub struct SignalCache {
    entries: DashMap<String, CompactSignal>,
    capacity: usize,
    stats: CacheStats,
}

impl SignalCache {
    /// Cache with the default 65,536-slot capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Cache with `capacity` slots, rounded up to a power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        Self {
            entries: DashMap::with_capacity(capacity),
            capacity,
            stats: CacheStats::default(),
        }
    }

    /// Store the most recent signal for a symbol. Overwrites any existing
    /// entry for the same symbol; a *new* symbol is refused (and counted)
    /// when the cache is full - run [`Self::evict_expired`] to make room.
    /// The capacity check is approximate under racing new-symbol inserts.
    pub fn insert(&self, symbol: &str, signal: CompactSignal) -> bool {
        if !self.entries.contains_key(symbol) && self.entries.len() >= self.capacity {
            self.stats.rejected_inserts.fetch_add(1, Ordering::Relaxed);
            debug!("[CACHE] full ({} slots), refusing new symbol {symbol}", self.capacity);
            return false;
        }

        self.entries.insert(symbol.to_string(), signal);
        self.stats.insertions.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Copy of the most recent signal for a symbol.
    pub fn lookup(&self, symbol: &str) -> Option<CompactSignal> {
        match self.entries.get(symbol) {
            Some(entry) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(*entry)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Drop every entry whose TTL has lapsed at `now_ns`.
    pub fn evict_expired(&self, now_ns: u64) {
        let before = self.entries.len();
        self.entries.retain(|_, signal| !signal.is_expired(now_ns));
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            self.stats
                .evictions
                .fetch_add(evicted as u64, Ordering::Relaxed);
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl Default for SignalCache {
    fn default() -> Self {
        Self::new()
    }
}

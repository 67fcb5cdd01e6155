// =============================================================================
// Bounded LRU Cache - per-bar memoization with hit/miss accounting
// =============================================================================
//
// `LruCache` is a fixed-capacity map with true least-recently-used eviction.
// Every access stamps the entry with a monotonically increasing tick; the
// `order` index maps tick -> key so the oldest entry is always the first key
// in the BTreeMap.
//
// `BarCache` layers the per-bar memo tables the engine needs on top of it and
// clears everything when the bar index jumps by more than the configured gap
// (a data reload or a long pause would otherwise serve stale values).
// =============================================================================

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use serde::Serialize;
use tracing::debug;

use crate::provider::Indicators;
use crate::types::Series;

/// Hit / miss / eviction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache, 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    fn merge(&mut self, other: CacheStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.evictions += other.evictions;
    }
}

/// Fixed-capacity key/value store with least-recently-used eviction.
#[derive(Debug, Clone)]
pub struct LruCache<K, V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
    stats: CacheStats,
}

impl<K, V> LruCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            tick: 0,
            entries: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
            stats: CacheStats::default(),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up `key`, promoting it to most-recently-used on a hit.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let tick = self.next_tick();
        match self.entries.get_mut(key) {
            Some((value, stamp)) => {
                self.order.remove(&*stamp);
                *stamp = tick;
                self.order.insert(tick, key.clone());
                self.stats.hits += 1;
                Some(value.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Insert or overwrite `key`. Inserting a new key into a full cache
    /// evicts the least-recently-used entry.
    pub fn put(&mut self, key: K, value: V) {
        let tick = self.next_tick();

        if let Some((slot, stamp)) = self.entries.get_mut(&key) {
            self.order.remove(&*stamp);
            *slot = value;
            *stamp = tick;
            self.order.insert(tick, key);
            return;
        }

        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }

        self.order.insert(tick, key.clone());
        self.entries.insert(key, (value, tick));
    }

    /// Return the cached value or compute, store and return it.
    pub fn get_or_insert_with(&mut self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(v) = self.get(&key) {
            return v;
        }
        let v = compute();
        self.put(key, v.clone());
        v
    }

    fn evict_oldest(&mut self) {
        let oldest = self.order.keys().next().copied();
        if let Some(stamp) = oldest {
            if let Some(key) = self.order.remove(&stamp) {
                self.entries.remove(&key);
                self.stats.evictions += 1;
            }
        }
    }

    /// Whether `key` is present. Does not promote and does not count.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
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

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

// =============================================================================
// BarCache
// =============================================================================

/// Per-bar memo tables used during one bar's evaluation.
#[derive(Debug, Clone)]
pub struct BarCache {
    indicators: LruCache<(u64, Series), f64>,
    ma_spread_pct: LruCache<u64, f64>,
    momentum_threshold: LruCache<u64, f64>,
    max_gap: u64,
    last_index: Option<u64>,
    invalidations: u64,
}

impl BarCache {
    pub fn new(capacity: usize, max_gap: u64) -> Self {
        Self {
            indicators: LruCache::new(capacity),
            ma_spread_pct: LruCache::new(capacity),
            momentum_threshold: LruCache::new(capacity),
            max_gap,
            last_index: None,
            invalidations: 0,
        }
    }

    /// Record that evaluation moved to `index`. Clears all tables when the
    /// index jumps forward by more than the configured gap or moves backward.
    /// Returns `true` when the cache was invalidated.
    pub fn advance_to(&mut self, index: u64) -> bool {
        let stale = match self.last_index {
            Some(last) if index < last => true,
            Some(last) => index - last > self.max_gap,
            None => false,
        };

        if stale {
            debug!(
                from = ?self.last_index,
                to = index,
                max_gap = self.max_gap,
                "bar cache invalidated"
            );
            self.clear();
            self.invalidations += 1;
        }

        if self.last_index.map_or(true, |last| index > last) || stale {
            self.last_index = Some(index);
        }
        stale
    }

    pub fn indicator(&mut self, index: u64, series: Series, compute: impl FnOnce() -> f64) -> f64 {
        self.indicators.get_or_insert_with((index, series), compute)
    }

    pub fn ma_spread_pct(&mut self, index: u64, compute: impl FnOnce() -> f64) -> f64 {
        self.ma_spread_pct.get_or_insert_with(index, compute)
    }

    pub fn momentum_threshold(&mut self, index: u64, compute: impl FnOnce() -> f64) -> f64 {
        self.momentum_threshold.get_or_insert_with(index, compute)
    }

    /// Pre-fill indicator reads for every series over `from..=to`. Returns
    /// the number of values newly computed.
    pub fn warm(&mut self, indicators: &impl Indicators, from: u64, to: u64) -> usize {
        let mut filled = 0;
        for index in from..=to {
            for series in Series::ALL {
                if self.has_indicator(index, series) {
                    continue;
                }
                let v = indicators.indicator(series, index).unwrap_or(f64::NAN);
                self.indicators.put((index, series), v);
                filled += 1;
            }
        }
        debug!(from, to, filled, "bar cache warmed");
        filled
    }

    /// Whether an indicator value for `(index, series)` is already memoized.
    pub fn has_indicator(&self, index: u64, series: Series) -> bool {
        self.indicators.contains(&(index, series))
    }

    pub fn clear(&mut self) {
        self.indicators.clear();
        self.ma_spread_pct.clear();
        self.momentum_threshold.clear();
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations
    }

    /// Combined counters across all tables.
    pub fn stats(&self) -> CacheStats {
        let mut total = self.indicators.stats();
        total.merge(self.ma_spread_pct.stats());
        total.merge(self.momentum_threshold.stats());
        total
    }
}

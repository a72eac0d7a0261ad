//! In-process result cache with write-time expiry and single-flight fills.
//!
//! Entries expire a fixed time after they were written and are never served
//! afterwards. When the cache holds more than `maximum_size` entries the one
//! inserted longest ago is evicted. Concurrent misses on the same key are
//! collapsed: one caller computes, the others wait and reuse its result. A
//! failed computation stores nothing, so the next waiter computes again.

use crate::metrics::CacheMetrics;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::debug;

/// Result cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Number of entries the table is pre-sized for
    pub initial_capacity: usize,
    /// Maximum number of live entries
    pub maximum_size: usize,
    /// Time after insertion at which an entry expires
    pub expire_after_write: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 100,
            maximum_size: 500,
            expire_after_write: Duration::from_secs(10 * 60),
        }
    }
}

impl CacheConfig {
    /// Create config with custom initial capacity.
    #[must_use]
    pub const fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Create config with custom maximum size.
    #[must_use]
    pub const fn with_maximum_size(mut self, size: usize) -> Self {
        self.maximum_size = size;
        self
    }

    /// Create config with custom expiry.
    #[must_use]
    pub const fn with_expire_after_write(mut self, ttl: Duration) -> Self {
        self.expire_after_write = ttl;
        self
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that had to compute
    pub misses: u64,
    /// Entries currently stored, expired ones not yet purged included
    pub size: u64,
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    seq: u64,
}

struct Store<K, V> {
    entries: HashMap<K, Entry<V>>,
    order: BTreeMap<u64, K>,
    next_seq: u64,
}

impl<K: Eq + Hash + Clone, V> Store<K, V> {
    fn remove(&mut self, key: &K) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }
}

type InFlightTable<K> = Mutex<HashMap<K, Arc<AsyncMutex<()>>>>;

/// Per-key fill guard, removed from the in-flight table by its last holder.
struct InFlight<'a, K: Eq + Hash> {
    table: &'a InFlightTable<K>,
    key: K,
    lock: Arc<AsyncMutex<()>>,
}

impl<K: Eq + Hash> Drop for InFlight<'_, K> {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        // The table and this guard hold the only references.
        if Arc::strong_count(&self.lock) == 2 {
            table.remove(&self.key);
        }
    }
}

/// Named cache of computed results.
pub struct ResultCache<K, V> {
    name: String,
    config: CacheConfig,
    store: Mutex<Store<K, V>>,
    in_flight: InFlightTable<K>,
    metrics: CacheMetrics,
}

impl<K, V> fmt::Debug for ResultCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty cache.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Self {
        let capacity = config.initial_capacity.min(config.maximum_size);
        Self {
            name: name.into(),
            store: Mutex::new(Store {
                entries: HashMap::with_capacity(capacity),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
            in_flight: Mutex::new(HashMap::new()),
            metrics: CacheMetrics::new(),
            config,
        }
    }

    /// Name of the cache.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the live value for `key`, or compute, store and return it.
    ///
    /// # Errors
    ///
    /// Returns the error of `compute` unchanged. Nothing is stored then.
    pub async fn get_or_compute<F, Fut, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.lookup(&key) {
            self.metrics.record_hit();
            return Ok(value);
        }

        let flight = self.join_in_flight(key);
        let _permit = flight.lock.lock().await;

        if let Some(value) = self.lookup(&flight.key) {
            self.metrics.record_hit();
            return Ok(value);
        }

        self.metrics.record_miss();
        debug!(cache = %self.name, "Cache miss, computing");
        let value = compute().await?;
        self.insert(flight.key.clone(), value.clone());
        Ok(value)
    }

    /// Return the live value for `key` without computing.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.lookup(key);
        if value.is_some() {
            self.metrics.record_hit();
        } else {
            self.metrics.record_miss();
        }
        value
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn insert(&self, key: K, value: V) {
        let mut store = self.store.lock();
        store.remove(&key);

        let seq = store.next_seq;
        store.next_seq += 1;
        store.order.insert(seq, key.clone());
        store.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                seq,
            },
        );

        while store.entries.len() > self.config.maximum_size {
            let Some((_, oldest)) = store.order.pop_first() else {
                break;
            };
            store.entries.remove(&oldest);
        }
        self.metrics.update_size(store.entries.len());
    }

    /// Drop the entry for `key`.
    pub fn invalidate(&self, key: &K) {
        let mut store = self.store.lock();
        store.remove(key);
        self.metrics.update_size(store.entries.len());
    }

    /// Drop every entry whose key matches `predicate`.
    pub fn invalidate_if(&self, predicate: impl Fn(&K) -> bool) {
        let mut store = self.store.lock();
        let doomed: Vec<K> = store.entries.keys().filter(|k| predicate(k)).cloned().collect();
        for key in &doomed {
            store.remove(key);
        }
        self.metrics.update_size(store.entries.len());
    }

    /// Drop every entry.
    pub fn invalidate_all(&self) {
        let mut store = self.store.lock();
        store.entries.clear();
        store.order.clear();
        self.metrics.update_size(0);
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    /// Check if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.metrics.hits.get(),
            misses: self.metrics.misses.get(),
            size: self.metrics.size.get(),
        }
    }

    fn lookup(&self, key: &K) -> Option<V> {
        let mut store = self.store.lock();
        let expired = store
            .entries
            .get(key)
            .map(|entry| entry.inserted_at.elapsed() >= self.config.expire_after_write)?;
        if expired {
            store.remove(key);
            self.metrics.update_size(store.entries.len());
            return None;
        }
        store.entries.get(key).map(|entry| entry.value.clone())
    }

    fn join_in_flight(&self, key: K) -> InFlight<'_, K> {
        let lock = {
            let mut table = self.in_flight.lock();
            Arc::clone(table.entry(key.clone()).or_default())
        };
        InFlight {
            table: &self.in_flight,
            key,
            lock,
        }
    }
}

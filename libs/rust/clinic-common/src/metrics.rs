//! In-process counters and the business metrics sink.
//!
//! The pipeline reports business events through the [`MetricsSink`] trait.
//! [`CounterRegistry`] is the default in-process sink; services may plug in a
//! Prometheus-backed sink instead, or [`NoopMetricsSink`] to disable counting.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter incremented for every successfully saved owner.
pub const OWNERS_CREATED: &str = "petclinic.owners.created";

/// Counter incremented for every successfully saved visit.
pub const VISITS_CREATED: &str = "petclinic.visits.created";

/// Receiver of named business counter increments.
///
/// Increments are fire-and-forget: a sink never fails the business call.
pub trait MetricsSink: Send + Sync {
    /// Increment the counter called `name` by one.
    fn increment(&self, name: &str);
}

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Increment the counter by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A gauge that can be set to any value.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    /// Create a new gauge.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Set the gauge value.
    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Get the current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Process-wide named counters, created on first increment.
#[derive(Debug, Default)]
pub struct CounterRegistry {
    counters: RwLock<BTreeMap<String, Arc<Counter>>>,
}

impl CounterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the counter called `name`, creating it at zero.
    #[must_use]
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        if let Some(counter) = self.counters.read().get(name) {
            return Arc::clone(counter);
        }
        let mut counters = self.counters.write();
        Arc::clone(counters.entry(name.to_string()).or_default())
    }

    /// Current value of `name`, zero if it was never incremented.
    #[must_use]
    pub fn get(&self, name: &str) -> u64 {
        self.counters.read().get(name).map_or(0, |c| c.get())
    }

    /// Snapshot of every counter, ordered by name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        self.counters
            .read()
            .iter()
            .map(|(name, counter)| (name.clone(), counter.get()))
            .collect()
    }
}

impl MetricsSink for CounterRegistry {
    fn increment(&self, name: &str) {
        self.counter(name).inc();
    }
}

/// Sink that drops every increment.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn increment(&self, _name: &str) {}
}

/// Hit, miss and size statistics of a result cache.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Cache hits
    pub hits: Counter,
    /// Cache misses
    pub misses: Counter,
    /// Current cache size
    pub size: Gauge,
}

impl CacheMetrics {
    /// Create zeroed cache metrics.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hits: Counter::new(),
            misses: Counter::new(),
            size: Gauge::new(),
        }
    }

    /// Record a cache hit.
    pub fn record_hit(&self) {
        self.hits.inc();
    }

    /// Record a cache miss.
    pub fn record_miss(&self) {
        self.misses.inc();
    }

    /// Update cache size.
    pub fn update_size(&self, size: usize) {
        self.size.set(u64::try_from(size).unwrap_or(u64::MAX));
    }
}

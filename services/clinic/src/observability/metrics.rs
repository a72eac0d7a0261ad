//! Pipeline and Business Metrics
//!
//! Prometheus instruments for facade calls, and a [`MetricsSink`] that turns
//! named business counters into Prometheus counters.

use clinic_common::MetricsSink;
use parking_lot::RwLock;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Observability setup errors.
#[derive(Error, Debug)]
pub enum ObservabilityError {
    /// A metric could not be created or registered
    #[error("Metric registration failed: {0}")]
    Registration(#[from] prometheus::Error),

    /// Gathered metrics could not be rendered
    #[error("Metrics encoding failed: {0}")]
    Encoding(String),
}

/// Per-operation call metrics
pub struct PipelineMetrics {
    /// Calls by operation and outcome
    pub calls: IntCounterVec,
    /// Call duration by operation
    pub duration: HistogramVec,
}

impl PipelineMetrics {
    /// Creates and registers the call metrics
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let calls = IntCounterVec::new(
            Opts::new("calls_total", "Total facade calls").namespace("petclinic"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(calls.clone()))?;

        let duration = HistogramVec::new(
            HistogramOpts::new("call_duration_seconds", "Facade call duration in seconds")
                .namespace("petclinic")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["operation"],
        )?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self { calls, duration })
    }

    /// Records one finished call
    pub fn record(&self, operation: &str, outcome: &str, elapsed: Duration) {
        self.calls.with_label_values(&[operation, outcome]).inc();
        self.duration
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    /// Calls recorded for an operation and outcome
    #[must_use]
    pub fn call_count(&self, operation: &str, outcome: &str) -> u64 {
        self.calls.with_label_values(&[operation, outcome]).get()
    }
}

/// Prometheus name of a business counter: `petclinic.owners.created` becomes
/// `petclinic_owners_created_total`.
#[must_use]
pub fn prometheus_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    out.push_str("_total");
    out
}

/// Business counters backed by a Prometheus registry
pub struct PrometheusMetricsSink {
    registry: Registry,
    counters: RwLock<HashMap<String, IntCounter>>,
}

impl PrometheusMetricsSink {
    /// Creates a sink registering counters on `registry`
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            counters: RwLock::new(HashMap::new()),
        }
    }

    /// Current value of a business counter, if it was ever incremented
    #[must_use]
    pub fn value(&self, name: &str) -> Option<u64> {
        self.counters.read().get(name).map(IntCounter::get)
    }

    /// Renders every metric of the registry in the text exposition format
    pub fn gather_text(&self) -> Result<String, ObservabilityError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| ObservabilityError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| ObservabilityError::Encoding(e.to_string()))
    }

    fn counter(&self, name: &str) -> Result<IntCounter, prometheus::Error> {
        if let Some(counter) = self.counters.read().get(name) {
            return Ok(counter.clone());
        }
        let mut counters = self.counters.write();
        if let Some(counter) = counters.get(name) {
            return Ok(counter.clone());
        }
        let counter = IntCounter::new(prometheus_name(name), format!("Business counter {name}"))?;
        self.registry.register(Box::new(counter.clone()))?;
        counters.insert(name.to_string(), counter.clone());
        Ok(counter)
    }
}

impl MetricsSink for PrometheusMetricsSink {
    fn increment(&self, name: &str) {
        match self.counter(name) {
            Ok(counter) => counter.inc(),
            Err(e) => warn!(counter = %name, error = %e, "Failed to register business counter"),
        }
    }
}

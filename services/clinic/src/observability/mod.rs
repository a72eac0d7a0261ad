//! Observability Module
//!
//! Logging setup, Prometheus instruments and the business metrics sink chosen
//! by configuration.

pub mod logging;
pub mod metrics;

pub use logging::{MAX_LOGGED_VALUE, init_logging, truncate_for_log};
pub use metrics::{ObservabilityError, PipelineMetrics, PrometheusMetricsSink, prometheus_name};

use crate::config::Config;
use clinic_common::{CounterRegistry, MetricsSink, NoopMetricsSink};
use prometheus::Registry;
use std::sync::Arc;

/// Business metrics sink selected by configuration.
#[derive(Clone)]
pub enum MetricsBackend {
    /// Counting disabled
    Disabled,
    /// In-process atomic counters
    InProcess(Arc<CounterRegistry>),
    /// Prometheus counters
    Prometheus(Arc<PrometheusMetricsSink>),
}

impl MetricsBackend {
    /// The sink handed to the metrics layer.
    #[must_use]
    pub fn sink(&self) -> Arc<dyn MetricsSink> {
        match self {
            Self::Disabled => Arc::new(NoopMetricsSink),
            Self::InProcess(registry) => registry.clone(),
            Self::Prometheus(sink) => sink.clone(),
        }
    }

    /// Current value of a business counter.
    #[must_use]
    pub fn count(&self, name: &str) -> u64 {
        match self {
            Self::Disabled => 0,
            Self::InProcess(registry) => registry.get(name),
            Self::Prometheus(sink) => sink.value(name).unwrap_or(0),
        }
    }
}

/// Metrics wiring of one service instance.
pub struct Observability {
    /// Registry every Prometheus instrument is registered on
    pub registry: Registry,
    /// Business counters
    pub business: MetricsBackend,
    /// Call metrics, present when Prometheus is enabled
    pub pipeline: Option<Arc<PipelineMetrics>>,
}

impl Observability {
    /// Build the sinks described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ObservabilityError::Registration`] when a Prometheus
    /// instrument cannot be registered.
    pub fn from_config(config: &Config) -> Result<Self, ObservabilityError> {
        let registry = Registry::new();
        let prometheus = config.metrics_enabled && config.metrics_prometheus_enabled;

        let business = if !config.metrics_enabled {
            MetricsBackend::Disabled
        } else if prometheus {
            MetricsBackend::Prometheus(Arc::new(PrometheusMetricsSink::new(registry.clone())))
        } else {
            MetricsBackend::InProcess(Arc::new(CounterRegistry::new()))
        };

        let pipeline = if prometheus {
            Some(Arc::new(PipelineMetrics::new(&registry)?))
        } else {
            None
        };

        Ok(Self {
            registry,
            business,
            pipeline,
        })
    }

    /// Prometheus exposition text, when Prometheus is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`ObservabilityError::Encoding`] when rendering fails.
    pub fn exposition(&self) -> Result<Option<String>, ObservabilityError> {
        match &self.business {
            MetricsBackend::Prometheus(sink) => sink.gather_text().map(Some),
            _ => Ok(None),
        }
    }
}

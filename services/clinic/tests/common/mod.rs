//! Shared fixtures for the clinic integration tests.

#![allow(dead_code)]

use chrono::NaiveDate;
use clinic::domain::{Owner, Visit};
use clinic::pipeline::ClinicPipelineBuilder;
use clinic::{ClinicPipeline, InMemoryClinic};
use std::sync::Arc;
use test_utils::fixtures::{
    fast_circuit_breaker_config, fast_retry_config, small_cache_config, tight_rate_limiter_config,
};
use test_utils::mocks::{MockAuditStore, MockMetricsSink};

/// Id of George Franklin in the seeded clinic.
pub const GEORGE_ID: i64 = 1;

/// Id of Leo, George's cat, in the seeded clinic.
pub const LEO_ID: i64 = 5;

/// An unsaved owner with a well-known address and telephone.
pub fn sherlock() -> Owner {
    Owner::new("Sherlock", "Holmes", "221B Baker Street", "London", "5551234567")
}

/// An unsaved visit for `pet_id`.
pub fn checkup(pet_id: i64) -> Visit {
    let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    Visit::new(date, "checkup", pet_id)
}

/// Seeded clinic behind a pipeline with small policies and mock sinks.
pub struct Harness {
    pub backend: Arc<InMemoryClinic>,
    pub audit: Arc<MockAuditStore>,
    pub metrics: Arc<MockMetricsSink>,
    pub pipeline: ClinicPipeline,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(|builder| builder)
    }

    pub fn with(customize: impl FnOnce(ClinicPipelineBuilder) -> ClinicPipelineBuilder) -> Self {
        Self::over(Arc::new(MockAuditStore::new()), customize)
    }

    pub fn over(
        audit: Arc<MockAuditStore>,
        customize: impl FnOnce(ClinicPipelineBuilder) -> ClinicPipelineBuilder,
    ) -> Self {
        let backend = Arc::new(InMemoryClinic::seeded());
        let metrics = Arc::new(MockMetricsSink::new());
        let builder = ClinicPipeline::builder(backend.clone())
            .circuit_breaker(fast_circuit_breaker_config())
            .rate_limiter(tight_rate_limiter_config(100))
            .retry(fast_retry_config())
            .cache(small_cache_config())
            .audit_store(audit.clone())
            .metrics_sink(metrics.clone());
        let pipeline = customize(builder).build();

        Self {
            backend,
            audit,
            metrics,
            pipeline,
        }
    }
}

//! Mock implementations for testing.
//!
//! This module provides hand-written doubles for the audit and metrics sinks
//! and an operation that fails a configurable number of times.

use async_trait::async_trait;
use clinic_common::{AuditError, AuditRecord, AuditStore, ClinicError, MetricsSink};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Mock audit store recording every record it accepts.
#[derive(Debug, Default)]
pub struct MockAuditStore {
    records: Mutex<Vec<AuditRecord>>,
    attempts: AtomicU32,
    fail: AtomicBool,
}

impl MockAuditStore {
    /// Create a new mock audit store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose every write fails.
    #[must_use]
    pub fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    /// Toggle write failures.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Get all accepted records.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Number of accepted records.
    #[must_use]
    pub fn count(&self) -> usize {
        self.records.lock().len()
    }

    /// Number of store calls, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditStore for MockAuditStore {
    async fn store(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuditError::StoreUnavailable("mock store offline".to_string()));
        }
        self.records.lock().push(record);
        Ok(())
    }
}

/// Mock metrics sink recording increment names in order.
#[derive(Debug, Default)]
pub struct MockMetricsSink {
    increments: Mutex<Vec<String>>,
}

impl MockMetricsSink {
    /// Create a new mock metrics sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every increment received, oldest first.
    #[must_use]
    pub fn increments(&self) -> Vec<String> {
        self.increments.lock().clone()
    }

    /// How many times `name` was incremented.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.increments.lock().iter().filter(|n| *n == name).count()
    }
}

impl MetricsSink for MockMetricsSink {
    fn increment(&self, name: &str) {
        self.increments.lock().push(name.to_string());
    }
}

/// Operation failing its first `failures` invocations.
#[derive(Debug)]
pub struct FlakyOperation {
    failures: u32,
    error: fn() -> ClinicError,
    calls: AtomicU32,
}

impl FlakyOperation {
    /// Fail `failures` times with the error built by `error`, then succeed.
    #[must_use]
    pub const fn new(failures: u32, error: fn() -> ClinicError) -> Self {
        Self {
            failures,
            error,
            calls: AtomicU32::new(0),
        }
    }

    /// Fail `failures` times with a transient error.
    #[must_use]
    pub fn transient(failures: u32) -> Self {
        Self::new(failures, || ClinicError::unavailable("flaky backend"))
    }

    /// Never succeed.
    #[must_use]
    pub fn always_failing(error: fn() -> ClinicError) -> Self {
        Self::new(u32::MAX, error)
    }

    /// Invoke the operation, returning the 1-based call number on success.
    ///
    /// # Errors
    ///
    /// Returns the configured error while failures remain.
    pub async fn call(&self) -> Result<u32, ClinicError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            Err((self.error)())
        } else {
            Ok(n)
        }
    }

    /// Number of invocations so far.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

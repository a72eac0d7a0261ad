//! Shared library for cross-cutting concerns in petclinic Rust services.
//!
//! This crate provides centralized implementations for:
//! - Error types with failure classification (transient, rejected, validation, fatal)
//! - Per-request context (correlation id, acting principal)
//! - Token-bucket rate limiting with bounded waits
//! - Sliding-window circuit breaker
//! - Retry policy for transient failures
//! - Result cache with write-time expiry and single-flight computation
//! - Append-only audit records with PII masking
//! - Counter metrics and pluggable metrics sinks

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod cache;
pub mod circuit_breaker;
pub mod context;
pub mod error;
pub mod masking;
pub mod metrics;
pub mod rate_limiter;
pub mod retry;

pub use audit::{
    AuditAction, AuditError, AuditRecord, AuditRecorder, AuditStore, Auditable,
    InMemoryAuditStore, NoopAuditStore,
};
pub use cache::{CacheConfig, CacheStats, ResultCache};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitPermit, CircuitState,
};
pub use context::RequestContext;
pub use error::{ClinicError, ErrorClass};
pub use metrics::{CounterRegistry, MetricsSink, NoopMetricsSink};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterRegistry};
pub use retry::{RetryConfig, RetryPolicy};

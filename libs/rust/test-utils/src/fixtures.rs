//! Test fixtures with sample data.
//!
//! Request contexts and policy configurations small enough to drive every
//! state transition in a handful of calls.

use clinic_common::{CacheConfig, CircuitBreakerConfig, RateLimiterConfig, RequestContext, RetryConfig};
use std::time::Duration;
use uuid::Uuid;

/// Principal used by authenticated fixtures.
pub const ADMIN_PRINCIPAL: &str = "admin";

/// Context of an unauthenticated request with a fresh correlation id.
#[must_use]
pub fn anonymous_context() -> RequestContext {
    RequestContext::new().with_correlation_id(Uuid::new_v4().to_string())
}

/// Context of a request made by [`ADMIN_PRINCIPAL`].
#[must_use]
pub fn admin_context() -> RequestContext {
    anonymous_context().with_principal(ADMIN_PRINCIPAL)
}

/// Context with a fixed correlation id.
#[must_use]
pub fn context_with_correlation(id: &str) -> RequestContext {
    RequestContext::new().with_correlation_id(id)
}

/// Breaker opening after four outcomes at 50% failures, waiting one second.
#[must_use]
pub fn fast_circuit_breaker_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig::default()
        .with_sliding_window_size(4)
        .with_failure_rate_threshold(0.5)
        .with_wait_duration_in_open_state(Duration::from_secs(1))
}

/// Limiter admitting `limit` calls per second with the default 25 ms timeout.
#[must_use]
pub fn tight_rate_limiter_config(limit: u32) -> RateLimiterConfig {
    RateLimiterConfig::default()
        .with_limit_for_period(limit)
        .with_limit_refresh_period(Duration::from_secs(1))
        .with_timeout_duration(Duration::from_millis(25))
}

/// Three attempts, 10 ms apart.
#[must_use]
pub fn fast_retry_config() -> RetryConfig {
    RetryConfig::default()
        .with_max_attempts(3)
        .with_wait_duration(Duration::from_millis(10))
}

/// Ten entries, one minute expiry.
#[must_use]
pub fn small_cache_config() -> CacheConfig {
    CacheConfig::default()
        .with_initial_capacity(10)
        .with_maximum_size(10)
        .with_expire_after_write(Duration::from_secs(60))
}

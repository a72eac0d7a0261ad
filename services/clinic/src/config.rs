//! Type-Safe Configuration with Validation
//!
//! Resilience policy parameters, sink selection and logging options, read from
//! the environment (and `.env`) with the documented defaults.

use clinic_common::{CacheConfig, CircuitBreakerConfig, RateLimiterConfig, RetryConfig};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    /// Failure rate threshold outside `(0, 1]`
    #[error("Invalid failure rate threshold {0}: must be in (0, 1]")]
    InvalidThreshold(f64),

    /// A value that must be positive is zero
    #[error("Invalid {0}: must be greater than 0")]
    NotPositive(&'static str),

    /// Cache pre-sizing larger than the cache bound
    #[error("Invalid cache sizing: initial capacity {initial} exceeds maximum size {maximum}")]
    InvalidCacheSizing {
        /// Configured initial capacity
        initial: usize,
        /// Configured maximum size
        maximum: usize,
    },

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// Parser message
        reason: String,
    },
}

/// Service configuration with validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Service name reported in logs
    pub service_name: String,
    /// Default log level when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON log lines
    pub log_json: bool,
    /// Circuit breaker parameters
    pub circuit_breaker: CircuitBreakerConfig,
    /// Rate limiter parameters
    pub rate_limiter: RateLimiterConfig,
    /// Retry parameters
    pub retry: RetryConfig,
    /// Result cache parameters
    pub cache: CacheConfig,
    /// Persist audit records; a no-op store is installed otherwise
    pub audit_enabled: bool,
    /// Count business events; a no-op sink is installed otherwise
    pub metrics_enabled: bool,
    /// Count into Prometheus instead of the in-process registry
    pub metrics_prometheus_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "petclinic".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            audit_enabled: true,
            metrics_enabled: true,
            metrics_prometheus_enabled: false,
        }
    }
}

impl Config {
    /// Loads configuration from `.env` and environment variables with validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source with validation.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let cb = &defaults.circuit_breaker;
        let rl = &defaults.rate_limiter;
        let retry = &defaults.retry;
        let cache = &defaults.cache;
        let env = Env { lookup: &lookup };

        let config = Self {
            service_name: env.string("SERVICE_NAME", &defaults.service_name),
            log_level: env.string("LOG_LEVEL", &defaults.log_level),
            log_json: env.parse("LOG_JSON", defaults.log_json)?,
            circuit_breaker: CircuitBreakerConfig {
                failure_rate_threshold: env.parse(
                    "CIRCUITBREAKER_FAILURE_RATE_THRESHOLD",
                    cb.failure_rate_threshold,
                )?,
                sliding_window_size: env
                    .parse("CIRCUITBREAKER_SLIDING_WINDOW_SIZE", cb.sliding_window_size)?,
                wait_duration_in_open_state: env.millis(
                    "CIRCUITBREAKER_WAIT_DURATION_IN_OPEN_STATE_MS",
                    cb.wait_duration_in_open_state,
                )?,
                permitted_calls_in_half_open_state: env.parse(
                    "CIRCUITBREAKER_PERMITTED_CALLS_IN_HALF_OPEN_STATE",
                    cb.permitted_calls_in_half_open_state,
                )?,
            },
            rate_limiter: RateLimiterConfig {
                limit_for_period: env
                    .parse("RATELIMITER_LIMIT_FOR_PERIOD", rl.limit_for_period)?,
                limit_refresh_period: Duration::from_secs(env.parse(
                    "RATELIMITER_LIMIT_REFRESH_PERIOD_SECS",
                    rl.limit_refresh_period.as_secs(),
                )?),
                timeout_duration: env
                    .millis("RATELIMITER_TIMEOUT_DURATION_MS", rl.timeout_duration)?,
            },
            retry: RetryConfig {
                max_attempts: env.parse("RETRY_MAX_ATTEMPTS", retry.max_attempts)?,
                wait_duration: env.millis("RETRY_WAIT_DURATION_MS", retry.wait_duration)?,
                jitter: retry.jitter,
            },
            cache: CacheConfig {
                initial_capacity: env.parse("CACHE_INITIAL_CAPACITY", cache.initial_capacity)?,
                maximum_size: env.parse("CACHE_MAXIMUM_SIZE", cache.maximum_size)?,
                expire_after_write: Duration::from_secs(
                    env.parse(
                        "CACHE_EXPIRE_AFTER_WRITE_MINUTES",
                        cache.expire_after_write.as_secs() / 60,
                    )?.saturating_mul(60),
                ),
            },
            audit_enabled: env.parse("AUDIT_ENABLED", defaults.audit_enabled)?,
            metrics_enabled: env.parse("METRICS_ENABLED", defaults.metrics_enabled)?,
            metrics_prometheus_enabled: env.parse(
                "METRICS_PROMETHEUS_ENABLED",
                defaults.metrics_prometheus_enabled,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.circuit_breaker.failure_rate_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        if self.circuit_breaker.sliding_window_size == 0 {
            return Err(ConfigError::NotPositive("sliding window size"));
        }
        if self.circuit_breaker.permitted_calls_in_half_open_state == 0 {
            return Err(ConfigError::NotPositive("permitted calls in half-open state"));
        }
        if self.rate_limiter.limit_for_period == 0 {
            return Err(ConfigError::NotPositive("limit for period"));
        }
        if self.rate_limiter.limit_refresh_period < Duration::from_secs(1) {
            return Err(ConfigError::NotPositive("limit refresh period"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::NotPositive("retry max attempts"));
        }
        if self.cache.maximum_size == 0 {
            return Err(ConfigError::NotPositive("cache maximum size"));
        }
        if self.cache.initial_capacity > self.cache.maximum_size {
            return Err(ConfigError::InvalidCacheSizing {
                initial: self.cache.initial_capacity,
                maximum: self.cache.maximum_size,
            });
        }
        if self.cache.expire_after_write < Duration::from_secs(60) {
            return Err(ConfigError::NotPositive("cache expiry"));
        }
        Ok(())
    }
}

struct Env<'a, F> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn string(&self, name: &str, default: &str) -> String {
        (self.lookup)(name).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable with a default value.
    fn parse<T: std::str::FromStr>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T::Err: std::fmt::Display,
    {
        match (self.lookup)(name) {
            Some(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
                name: name.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn millis(&self, name: &str, default: Duration) -> Result<Duration, ConfigError> {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.parse(name, default_ms).map(Duration::from_millis)
    }
}

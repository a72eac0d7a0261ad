//! Retry policy with a fixed wait between attempts.
//!
//! Only failures classified as transient are retried. Every other outcome is
//! returned after the attempt that produced it.

use crate::error::ClinicError;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay between attempts
    pub wait_duration: Duration,
    /// Whether to add up to 25% random jitter to the wait
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            wait_duration: Duration::from_millis(500),
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom max attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Create a new retry config with custom wait duration.
    #[must_use]
    pub const fn with_wait_duration(mut self, wait: Duration) -> Self {
        self.wait_duration = wait;
        self
    }

    /// Create a new retry config with jitter enabled.
    #[must_use]
    pub const fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }
}

/// Retry policy for executing operations with automatic retries.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy with the given configuration.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a retry policy with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Delay to sleep before the next attempt.
    #[must_use]
    pub fn wait_before_next_attempt(&self) -> Duration {
        if self.config.jitter {
            self.config
                .wait_duration
                .mul_f64(1.0 + rand::random::<f64>() * 0.25)
        } else {
            self.config.wait_duration
        }
    }

    /// Check if an error should be retried after `attempt` attempts (1-based).
    #[must_use]
    pub const fn should_retry(&self, error: &ClinicError, attempt: u32) -> bool {
        attempt < self.config.max_attempts && error.is_retryable()
    }

    /// Execute an async operation with retries.
    ///
    /// # Errors
    ///
    /// Returns the first non-transient error, or the last transient error once
    /// all attempts are exhausted.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, ClinicError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClinicError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !self.should_retry(&error, attempt) {
                        return Err(error);
                    }
                    let delay = self.wait_before_next_attempt();
                    debug!(attempt, delay_ms = delay.as_millis(), error = %error, "Retrying after transient failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Get the maximum number of attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

//! Centralized error types for the clinic services.
//!
//! Every failure that crosses the interception pipeline is a [`ClinicError`],
//! and every error belongs to exactly one [`ErrorClass`]. The class decides how
//! the resilience policies react: only transient failures are retried, only
//! transient and fatal failures count against a circuit breaker, and rejected
//! calls are surfaced to the caller as a throttled/unavailable condition.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The backend failed in a way expected to succeed on retry
    Transient,
    /// The call was refused by a rate limiter or an open circuit
    Rejected,
    /// Caller-supplied input was invalid
    Validation,
    /// Unexpected internal error
    Fatal,
}

impl ErrorClass {
    /// Stable lowercase name, used as a log field and metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Rejected => "rejected",
            Self::Validation => "validation",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common error type for clinic operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ClinicError {
    /// No permit could be obtained from the named rate limiter in time
    #[error("Rate limiter {limiter} rejected the call after waiting {timeout:?}")]
    RateLimited {
        /// Name of the rate limiter
        limiter: String,
        /// How long the caller waited before giving up
        timeout: Duration,
    },

    /// The named circuit is open and short-circuits calls
    #[error("Circuit breaker {circuit} is open")]
    CircuitOpen {
        /// Name of the circuit
        circuit: String,
        /// Time until the circuit lets a trial call through
        retry_after: Duration,
    },

    /// Backend temporarily unavailable
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Backend call timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClinicError {
    /// Classify this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use clinic_common::{ClinicError, ErrorClass};
    ///
    /// assert_eq!(ClinicError::unavailable("db").class(), ErrorClass::Transient);
    /// assert_eq!(ClinicError::not_found("pet 7").class(), ErrorClass::Validation);
    /// ```
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::RateLimited { .. } | Self::CircuitOpen { .. } => ErrorClass::Rejected,
            Self::Unavailable(_) | Self::Timeout(_) => ErrorClass::Transient,
            Self::InvalidInput(_) | Self::NotFound(_) => ErrorClass::Validation,
            Self::Internal(_) => ErrorClass::Fatal,
        }
    }

    /// Check if this error may succeed when the same call is attempted again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient)
    }

    /// Check if the call was refused before reaching the business method.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self.class(), ErrorClass::Rejected)
    }

    /// Check if this error counts as a backend failure for circuit breaking.
    #[must_use]
    pub const fn is_backend_failure(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient | ErrorClass::Fatal)
    }

    /// Suggested back-off before calling again, for rejections.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { timeout, .. } => Some(*timeout),
            Self::CircuitOpen { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Create a rate limited error for the given limiter.
    #[must_use]
    pub fn rate_limited(limiter: impl Into<String>, timeout: Duration) -> Self {
        Self::RateLimited {
            limiter: limiter.into(),
            timeout,
        }
    }

    /// Create a circuit open error for the given circuit.
    #[must_use]
    pub fn circuit_open(circuit: impl Into<String>, retry_after: Duration) -> Self {
        Self::CircuitOpen {
            circuit: circuit.into(),
            retry_after,
        }
    }

    /// Create an unavailable error with the given message.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an invalid input error with the given message.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a not found error with the given message.
    #[must_use]
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an internal error with the given message.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

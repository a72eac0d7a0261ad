//! User-visible rendering of pipeline failures.
//!
//! A [`ClinicError`] crossing the service boundary becomes an
//! [`ErrorResponse`]: a stable code, an HTTP status, a sanitized message and,
//! for rejections, the time after which a retry may succeed. Details of
//! backend failures never leave the process.

use clinic_common::{ClinicError, ErrorClass};
use serde::Serialize;
use std::time::Duration;

/// Shortest digit run treated as a telephone number in a message.
const PHONE_DIGITS: usize = 7;

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Rate limiter rejected the call
    RateLimited,
    /// Circuit breaker rejected the call
    CircuitOpen,
    /// Backend temporarily unavailable
    ServiceUnavailable,
    /// Backend did not answer in time
    Timeout,
    /// Invalid arguments
    InvalidInput,
    /// Requested entity does not exist
    NotFound,
    /// Anything else
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "RATE_LIMITED",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::InvalidInput => "INVALID_INPUT",
            Self::NotFound => "NOT_FOUND",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::RateLimited | Self::CircuitOpen => 503,
            Self::InvalidInput => 400,
            Self::NotFound => 404,
            Self::ServiceUnavailable | Self::Timeout | Self::Internal => 500,
        }
    }
}

/// Structured error response with correlation ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable message (sanitized)
    pub message: String,
    /// Correlation ID for tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Optional retry-after duration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
}

impl ErrorResponse {
    /// Create a new error response from a [`ClinicError`]
    #[must_use]
    pub fn from_error(error: &ClinicError, correlation_id: Option<&str>) -> Self {
        let (code, message) = match error {
            ClinicError::RateLimited { .. } => (
                ErrorCode::RateLimited,
                "Too many requests, try again later".to_string(),
            ),
            ClinicError::CircuitOpen { .. } => (
                ErrorCode::CircuitOpen,
                "Service temporarily unavailable".to_string(),
            ),
            ClinicError::InvalidInput(msg) => (ErrorCode::InvalidInput, sanitize_message(msg)),
            ClinicError::NotFound(msg) => (ErrorCode::NotFound, sanitize_message(msg)),
            ClinicError::Unavailable(_) => (
                ErrorCode::ServiceUnavailable,
                "Service temporarily unavailable".to_string(),
            ),
            ClinicError::Timeout(_) => (ErrorCode::Timeout, "Request timed out".to_string()),
            // Never expose internal error details
            _ => (ErrorCode::Internal, "Internal error".to_string()),
        };

        Self {
            code,
            message,
            correlation_id: correlation_id.map(str::to_string),
            retry_after: error.retry_after(),
        }
    }

    /// HTTP status of this response
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

/// Whether a failure of this class is logged at error level.
#[must_use]
pub const fn is_severe(class: ErrorClass) -> bool {
    matches!(class, ErrorClass::Transient | ErrorClass::Fatal)
}

/// Sanitize a message by masking anything that looks like a telephone number
fn sanitize_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut digits = String::new();
    for c in message.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if digits.len() >= PHONE_DIGITS {
            out.push_str(&"*".repeat(digits.len()));
        } else {
            out.push_str(&digits);
        }
        digits.clear();
        out.push(c);
    }
    out.pop();
    out
}

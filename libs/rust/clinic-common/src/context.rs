//! Per-request context carried alongside every facade call.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Principal recorded when a request carries no authenticated identity.
pub const ANONYMOUS_PRINCIPAL: &str = "anonymous";

/// Request-scoped tracing and identity information.
///
/// Supplied by the request-handling layer for each call instead of being read
/// from ambient state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Correlation id of the inbound request
    pub correlation_id: Option<String>,
    /// Authenticated principal, if any
    pub principal: Option<String>,
}

impl RequestContext {
    /// Create an empty context (no correlation id, anonymous).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with a freshly generated correlation id.
    #[must_use]
    pub fn generated() -> Self {
        Self::new().with_correlation_id(Uuid::new_v4().to_string())
    }

    /// Add correlation ID.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Add authenticated principal.
    #[must_use]
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// The acting principal, or `"anonymous"` when none is authenticated.
    #[must_use]
    pub fn principal_or_anonymous(&self) -> &str {
        self.principal.as_deref().unwrap_or(ANONYMOUS_PRINCIPAL)
    }

    /// The correlation id, or `"-"` for log fields.
    #[must_use]
    pub fn correlation_id_or_dash(&self) -> &str {
        self.correlation_id.as_deref().unwrap_or("-")
    }
}

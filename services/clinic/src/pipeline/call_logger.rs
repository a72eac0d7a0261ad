//! Call Logging Tower Layer
//!
//! Outermost layer. Every call runs inside a `clinic_call` span carrying the
//! operation and correlation id. Entry and exit are logged at debug level,
//! failures at error (transient, fatal) or warn (rejected, validation). The
//! error itself is returned unchanged.

use super::Invocation;
use crate::error::is_severe;
use crate::facade::ClinicReply;
use crate::observability::{MAX_LOGGED_VALUE, PipelineMetrics, truncate_for_log};
use clinic_common::ClinicError;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{Instrument, Level, debug, error, info_span, warn};

/// Outcome label of a successful call.
pub const SUCCESS_OUTCOME: &str = "success";

/// Call logging layer for Tower
#[derive(Clone, Default)]
pub struct CallLoggerLayer {
    metrics: Option<Arc<PipelineMetrics>>,
}

impl CallLoggerLayer {
    /// Creates a layer that only logs
    pub fn new() -> Self {
        Self::default()
    }

    /// Also record call counts and durations
    #[must_use]
    pub fn with_metrics(mut self, metrics: Option<Arc<PipelineMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl<S> Layer<S> for CallLoggerLayer {
    type Service = CallLoggerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CallLoggerService {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

/// Call logging service wrapper
pub struct CallLoggerService<S> {
    inner: S,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl<S: Clone> Clone for CallLoggerService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S> Service<Invocation> for CallLoggerService<S>
where
    S: Service<Invocation, Response = ClinicReply, Error = ClinicError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = ClinicReply;
    type Error = ClinicError;
    type Future = BoxFuture<'static, Result<ClinicReply, ClinicError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Invocation) -> Self::Future {
        let metrics = self.metrics.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let operation = req.call.operation();
        let span = info_span!(
            "clinic_call",
            operation = %operation,
            correlation_id = %req.context.correlation_id_or_dash(),
        );

        // Arguments are only rendered when they will be written.
        let arguments = if tracing::enabled!(Level::DEBUG) || tracing::enabled!(Level::WARN) {
            req.call.fingerprint()
        } else {
            String::new()
        };

        Box::pin(
            async move {
                debug!(arguments = %arguments, "Entering");
                let started = Instant::now();
                let result = inner.call(req).await;
                let elapsed = started.elapsed();
                let duration_ms = elapsed.as_secs_f64() * 1000.0;

                let outcome = match &result {
                    Ok(reply) => {
                        if tracing::enabled!(Level::DEBUG) {
                            let rendered = format!("{reply:?}");
                            debug!(
                                result = %truncate_for_log(&rendered, MAX_LOGGED_VALUE),
                                duration_ms,
                                "Exiting"
                            );
                        }
                        SUCCESS_OUTCOME
                    }
                    Err(err) => {
                        let class = err.class();
                        if is_severe(class) {
                            error!(arguments = %arguments, class = %class, duration_ms, error = %err, "Call failed");
                        } else {
                            warn!(arguments = %arguments, class = %class, duration_ms, error = %err, "Call failed");
                        }
                        class.as_str()
                    }
                };

                if let Some(metrics) = metrics {
                    metrics.record(operation.as_str(), outcome, elapsed);
                }
                result
            }
            .instrument(span),
        )
    }
}

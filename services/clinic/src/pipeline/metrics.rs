//! Business Metrics Tower Layer
//!
//! Counts created owners and visits once the call has succeeded.

use super::Invocation;
use crate::facade::{ClinicReply, OperationName};
use clinic_common::metrics::{OWNERS_CREATED, VISITS_CREATED};
use clinic_common::{ClinicError, MetricsSink};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Counter incremented by a successful call of `operation`, if any.
#[must_use]
pub const fn counter_for(operation: OperationName) -> Option<&'static str> {
    match operation {
        OperationName::SaveOwner => Some(OWNERS_CREATED),
        OperationName::SaveVisit => Some(VISITS_CREATED),
        _ => None,
    }
}

/// Metrics layer for Tower
#[derive(Clone)]
pub struct MetricsLayer {
    sink: Arc<dyn MetricsSink>,
}

impl MetricsLayer {
    /// Creates a layer reporting to `sink`
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            sink: self.sink.clone(),
        }
    }
}

/// Metrics service wrapper
pub struct MetricsService<S> {
    inner: S,
    sink: Arc<dyn MetricsSink>,
}

impl<S: Clone> Clone for MetricsService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<S> Service<Invocation> for MetricsService<S>
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
        let counter = counter_for(req.call.operation());
        let sink = self.sink.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let reply = inner.call(req).await?;
            if let Some(name) = counter {
                sink.increment(name);
            }
            Ok(reply)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counted_operations() {
        assert_eq!(counter_for(OperationName::SaveOwner), Some(OWNERS_CREATED));
        assert_eq!(counter_for(OperationName::SaveVisit), Some(VISITS_CREATED));
        assert_eq!(counter_for(OperationName::SavePet), None);
        assert_eq!(counter_for(OperationName::FindVets), None);
    }
}

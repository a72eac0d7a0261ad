//! Retry Tower Layer
//!
//! Re-issues transiently failed calls through a fresh clone of the inner
//! service. Operations without a bound policy get exactly one attempt.

use super::Invocation;
use crate::facade::{ClinicReply, OperationName};
use clinic_common::{ClinicError, RetryPolicy};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service, ServiceExt};

type Policies = Arc<HashMap<OperationName, Arc<RetryPolicy>>>;

/// Retry layer for Tower
#[derive(Clone)]
pub struct RetryLayer {
    policies: Policies,
}

impl RetryLayer {
    /// Creates a layer from the retry policy bound to each operation
    pub fn new(policies: HashMap<OperationName, Arc<RetryPolicy>>) -> Self {
        Self {
            policies: Arc::new(policies),
        }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            policies: self.policies.clone(),
        }
    }
}

/// Retry service wrapper
pub struct RetryService<S> {
    inner: S,
    policies: Policies,
}

impl<S: Clone> Clone for RetryService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            policies: self.policies.clone(),
        }
    }
}

impl<S> Service<Invocation> for RetryService<S>
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
        let policy = self.policies.get(&req.call.operation()).cloned();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match policy {
                Some(policy) => {
                    policy
                        .execute(move || inner.clone().oneshot(req.clone()))
                        .await
                }
                None => inner.call(req).await,
            }
        })
    }
}

//! Rate Limiter Tower Layer
//!
//! Admits each call through the token bucket bound to its operation.

use super::Invocation;
use crate::facade::{ClinicReply, OperationName};
use clinic_common::{ClinicError, RateLimiter};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;

type Limiters = Arc<HashMap<OperationName, Arc<RateLimiter>>>;

/// Rate limiter layer for Tower
#[derive(Clone)]
pub struct RateLimitLayer {
    limiters: Limiters,
}

impl RateLimitLayer {
    /// Creates a layer from the limiter bound to each operation
    pub fn new(limiters: HashMap<OperationName, Arc<RateLimiter>>) -> Self {
        Self {
            limiters: Arc::new(limiters),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiters: self.limiters.clone(),
        }
    }
}

/// Rate limiter service wrapper
pub struct RateLimitService<S> {
    inner: S,
    limiters: Limiters,
}

impl<S: Clone> Clone for RateLimitService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiters: self.limiters.clone(),
        }
    }
}

impl<S> Service<Invocation> for RateLimitService<S>
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
        let limiter = self.limiters.get(&req.call.operation()).cloned();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if let Some(limiter) = limiter {
                if let Err(err) = limiter.acquire().await {
                    warn!(
                        limiter = %limiter.name(),
                        operation = %req.call.operation(),
                        "Call rejected by rate limiter"
                    );
                    return Err(err);
                }
            }
            inner.call(req).await
        })
    }
}

//! Circuit Breaker Tower Layer
//!
//! Short-circuits calls while the breaker bound to their operation is open.
//! Only backend failures are counted; rejections and validation errors from
//! inner layers leave the window untouched.

use super::Invocation;
use crate::facade::{ClinicReply, OperationName};
use clinic_common::{CircuitBreaker, ClinicError};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

type Breakers = Arc<HashMap<OperationName, Arc<CircuitBreaker>>>;

/// Circuit breaker layer for Tower
#[derive(Clone)]
pub struct CircuitBreakerLayer {
    breakers: Breakers,
}

impl CircuitBreakerLayer {
    /// Creates a layer from the breaker bound to each operation
    pub fn new(breakers: HashMap<OperationName, Arc<CircuitBreaker>>) -> Self {
        Self {
            breakers: Arc::new(breakers),
        }
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreakerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CircuitBreakerService {
            inner,
            breakers: self.breakers.clone(),
        }
    }
}

/// Circuit breaker service wrapper
pub struct CircuitBreakerService<S> {
    inner: S,
    breakers: Breakers,
}

impl<S: Clone> Clone for CircuitBreakerService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            breakers: self.breakers.clone(),
        }
    }
}

impl<S> Service<Invocation> for CircuitBreakerService<S>
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
        let breaker = self.breakers.get(&req.call.operation()).cloned();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match breaker {
                Some(breaker) => breaker.call(move || inner.call(req)).await,
                None => inner.call(req).await,
            }
        })
    }
}

//! Result Cache Tower Layer
//!
//! Memoizes read results under the call fingerprint. Mutations bypass the
//! cache and clear the caches bound for invalidation once they succeed.

use super::Invocation;
use crate::facade::{ClinicReply, OperationName};
use clinic_common::{ClinicError, ResultCache};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service, ServiceExt};
use tracing::debug;

/// Cache of facade replies keyed by call fingerprint.
pub type ReplyCache = ResultCache<String, ClinicReply>;

#[derive(Default)]
struct CacheBindings {
    memoize: HashMap<OperationName, Arc<ReplyCache>>,
    invalidate: HashMap<OperationName, Vec<Arc<ReplyCache>>>,
}

/// Cache layer for Tower
#[derive(Clone)]
pub struct CacheLayer {
    bindings: Arc<CacheBindings>,
}

impl CacheLayer {
    /// Creates a layer from the cache memoizing each read and the caches
    /// each mutation clears
    pub fn new(
        memoize: HashMap<OperationName, Arc<ReplyCache>>,
        invalidate: HashMap<OperationName, Vec<Arc<ReplyCache>>>,
    ) -> Self {
        Self {
            bindings: Arc::new(CacheBindings {
                memoize,
                invalidate,
            }),
        }
    }
}

impl<S> Layer<S> for CacheLayer {
    type Service = CacheService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CacheService {
            inner,
            bindings: self.bindings.clone(),
        }
    }
}

/// Cache service wrapper
pub struct CacheService<S> {
    inner: S,
    bindings: Arc<CacheBindings>,
}

impl<S: Clone> Clone for CacheService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            bindings: self.bindings.clone(),
        }
    }
}

impl<S> Service<Invocation> for CacheService<S>
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
        let operation = req.call.operation();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if operation.is_mutating() {
            let targets = self
                .bindings
                .invalidate
                .get(&operation)
                .cloned()
                .unwrap_or_default();
            return Box::pin(async move {
                let reply = inner.call(req).await?;
                for cache in &targets {
                    debug!(cache = %cache.name(), operation = %operation, "Invalidating cache");
                    cache.invalidate_all();
                }
                Ok(reply)
            });
        }

        match self.bindings.memoize.get(&operation).cloned() {
            Some(cache) => Box::pin(async move {
                let key = req.call.fingerprint();
                cache.get_or_compute(key, move || inner.oneshot(req)).await
            }),
            None => Box::pin(inner.call(req)),
        }
    }
}

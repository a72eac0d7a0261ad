//! Innermost service: hands the call to the business facade.

use super::Invocation;
use crate::facade::{ClinicReply, ClinicService};
use clinic_common::ClinicError;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// Invokes the business method named by the call.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn ClinicService>,
}

impl Dispatcher {
    /// Create a dispatcher in front of `backend`.
    pub fn new(backend: Arc<dyn ClinicService>) -> Self {
        Self { backend }
    }
}

impl Service<Invocation> for Dispatcher {
    type Response = ClinicReply;
    type Error = ClinicError;
    type Future = BoxFuture<'static, Result<ClinicReply, ClinicError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Invocation) -> Self::Future {
        let backend = self.backend.clone();
        Box::pin(async move { req.call.dispatch(backend.as_ref()).await })
    }
}

//! Audit Tower Layer
//!
//! Records one audit entry per successful save, after the retried unit has
//! completed. Failed calls leave no trace in the audit store.

use super::Invocation;
use crate::facade::ClinicReply;
use clinic_common::{AuditRecorder, ClinicError};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Audit layer for Tower
#[derive(Clone, Debug)]
pub struct AuditLayer {
    recorder: AuditRecorder,
}

impl AuditLayer {
    /// Creates a layer writing through `recorder`
    pub fn new(recorder: AuditRecorder) -> Self {
        Self { recorder }
    }
}

impl<S> Layer<S> for AuditLayer {
    type Service = AuditService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuditService {
            inner,
            recorder: self.recorder.clone(),
        }
    }
}

/// Audit service wrapper
pub struct AuditService<S> {
    inner: S,
    recorder: AuditRecorder,
}

impl<S: Clone> Clone for AuditService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            recorder: self.recorder.clone(),
        }
    }
}

impl<S> Service<Invocation> for AuditService<S>
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
        let recorder = self.recorder.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        // CREATE or UPDATE depends on the identity before the save.
        let action = req.call.audit_action();
        let context = req.context.clone();

        Box::pin(async move {
            let reply = inner.call(req).await?;
            if let (Some(action), Some(saved)) = (action, reply.saved_entity()) {
                recorder.record(action, saved, &context).await;
            }
            Ok(reply)
        })
    }
}

//! The interception pipeline around the clinic facade.
//!
//! Layer order, outermost first:
//! 1. CallLogger - span, entry/exit and failure logs
//! 2. RateLimit - token bucket admission
//! 3. CircuitBreaker - short-circuits while open
//! 4. Audit - one record per successful save
//! 5. Metrics - business counters
//! 6. Retry - transient failures of reads
//! 7. Cache - memoized reference data
//! 8. Dispatcher - the business method
//!
//! Audit and metrics sit outside retry, so they see the final outcome of a
//! call exactly once.

pub mod audit;
pub mod bindings;
pub mod cache;
pub mod call_logger;
pub mod circuit_breaker;
pub mod dispatcher;
pub mod metrics;
pub mod rate_limit;
pub mod retry;

pub use bindings::{OperationPolicy, PolicyBindings};
pub use cache::ReplyCache;
pub use dispatcher::Dispatcher;

use crate::config::Config;
use crate::domain::{Owner, Page, PageRequest, Pet, PetType, Vet, Visit};
use crate::facade::{ClinicCall, ClinicReply, ClinicService, OperationName};
use crate::observability::PipelineMetrics;
use async_trait::async_trait;
use audit::{AuditLayer, AuditService};
use cache::{CacheLayer, CacheService};
use call_logger::{CallLoggerLayer, CallLoggerService};
use circuit_breaker::{CircuitBreakerLayer, CircuitBreakerService};
use clinic_common::{
    AuditRecorder, AuditStore, CacheConfig, CircuitBreaker, CircuitBreakerConfig,
    CircuitBreakerRegistry, ClinicError, MetricsSink, NoopAuditStore, NoopMetricsSink,
    RateLimiter, RateLimiterConfig, RateLimiterRegistry, RequestContext, RetryConfig,
    RetryPolicy,
};
use metrics::{MetricsLayer, MetricsService};
use rate_limit::{RateLimitLayer, RateLimitService};
use retry::{RetryLayer, RetryService};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tower::{ServiceBuilder, ServiceExt};

/// One facade call travelling through the pipeline.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Operation and arguments
    pub call: ClinicCall,
    /// Caller identity and correlation id
    pub context: RequestContext,
}

impl Invocation {
    /// Create an invocation.
    #[must_use]
    pub const fn new(call: ClinicCall, context: RequestContext) -> Self {
        Self { call, context }
    }
}

/// The assembled service stack.
pub type ClinicStack = CallLoggerService<
    RateLimitService<
        CircuitBreakerService<
            AuditService<MetricsService<RetryService<CacheService<Dispatcher>>>>,
        >,
    >,
>;

/// Builder for [`ClinicPipeline`].
pub struct ClinicPipelineBuilder {
    backend: Arc<dyn ClinicService>,
    circuit_breaker: CircuitBreakerConfig,
    rate_limiter: RateLimiterConfig,
    retry: RetryConfig,
    cache: CacheConfig,
    bindings: PolicyBindings,
    audit_store: Arc<dyn AuditStore>,
    metrics_sink: Arc<dyn MetricsSink>,
    pipeline_metrics: Option<Arc<PipelineMetrics>>,
}

impl ClinicPipelineBuilder {
    /// Start from default policies, no audit store and no metrics sink.
    pub fn new(backend: Arc<dyn ClinicService>) -> Self {
        Self {
            backend,
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            bindings: PolicyBindings::default(),
            audit_store: Arc::new(NoopAuditStore),
            metrics_sink: Arc::new(NoopMetricsSink),
            pipeline_metrics: None,
        }
    }

    /// Take every policy parameter from `config`.
    #[must_use]
    pub fn with_config(self, config: &Config) -> Self {
        self.circuit_breaker(config.circuit_breaker.clone())
            .rate_limiter(config.rate_limiter.clone())
            .retry(config.retry.clone())
            .cache(config.cache.clone())
    }

    /// Parameters of every circuit breaker.
    #[must_use]
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Parameters of every rate limiter.
    #[must_use]
    pub fn rate_limiter(mut self, config: RateLimiterConfig) -> Self {
        self.rate_limiter = config;
        self
    }

    /// Parameters of every retry instance.
    #[must_use]
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Parameters of every cache.
    #[must_use]
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// Operation to policy bindings.
    #[must_use]
    pub fn bindings(mut self, bindings: PolicyBindings) -> Self {
        self.bindings = bindings;
        self
    }

    /// Where audit records go.
    #[must_use]
    pub fn audit_store(mut self, store: Arc<dyn AuditStore>) -> Self {
        self.audit_store = store;
        self
    }

    /// Where business counters go.
    #[must_use]
    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics_sink = sink;
        self
    }

    /// Record per-call Prometheus metrics.
    #[must_use]
    pub fn pipeline_metrics(mut self, metrics: Option<Arc<PipelineMetrics>>) -> Self {
        self.pipeline_metrics = metrics;
        self
    }

    /// Resolve the bindings and assemble the stack.
    #[must_use]
    pub fn build(self) -> ClinicPipeline {
        let circuit_breakers = Arc::new(CircuitBreakerRegistry::new(self.circuit_breaker));
        let rate_limiters = Arc::new(RateLimiterRegistry::new(self.rate_limiter));

        let breakers = self.bindings.resolve(
            |p| p.circuit_breaker.as_ref(),
            |name| circuit_breakers.get_or_create(name),
        );
        let limiters = self
            .bindings
            .resolve(|p| p.rate_limiter.as_ref(), |name| rate_limiters.get_or_create(name));

        let mut retries: HashMap<String, Arc<RetryPolicy>> = HashMap::new();
        let retry_config = self.retry;
        let retry_policies = self.bindings.resolve(
            |p| p.retry.as_ref(),
            |name| {
                retries
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(RetryPolicy::new(retry_config.clone())))
                    .clone()
            },
        );

        let mut caches: HashMap<String, Arc<ReplyCache>> = HashMap::new();
        let cache_config = self.cache;
        let mut cache_named = |name: &str| {
            caches
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(ReplyCache::new(name, cache_config.clone())))
                .clone()
        };
        let memoize = self.bindings.resolve(|p| p.cache.as_ref(), &mut cache_named);
        let mut invalidate = HashMap::new();
        for (op, policy) in self.bindings.iter() {
            if !policy.invalidates.is_empty() {
                let targets: Vec<_> = policy.invalidates.iter().map(|n| cache_named(n)).collect();
                invalidate.insert(op, targets);
            }
        }

        let stack = ServiceBuilder::new()
            .layer(CallLoggerLayer::new().with_metrics(self.pipeline_metrics))
            .layer(RateLimitLayer::new(limiters))
            .layer(CircuitBreakerLayer::new(breakers))
            .layer(AuditLayer::new(AuditRecorder::new(self.audit_store)))
            .layer(MetricsLayer::new(self.metrics_sink))
            .layer(RetryLayer::new(retry_policies))
            .layer(CacheLayer::new(memoize, invalidate))
            .service(Dispatcher::new(self.backend));

        ClinicPipeline {
            stack,
            circuit_breakers,
            rate_limiters,
            caches: Arc::new(caches),
            bindings: Arc::new(self.bindings),
        }
    }
}

/// The clinic facade wrapped in every resilience policy.
#[derive(Clone)]
pub struct ClinicPipeline {
    stack: ClinicStack,
    circuit_breakers: Arc<CircuitBreakerRegistry>,
    rate_limiters: Arc<RateLimiterRegistry>,
    caches: Arc<HashMap<String, Arc<ReplyCache>>>,
    bindings: Arc<PolicyBindings>,
}

impl fmt::Debug for ClinicPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut caches: Vec<_> = self.caches.keys().collect();
        caches.sort();
        f.debug_struct("ClinicPipeline")
            .field("bindings", &self.bindings)
            .field("caches", &caches)
            .finish_non_exhaustive()
    }
}

impl ClinicPipeline {
    /// Start building a pipeline in front of `backend`.
    pub fn builder(backend: Arc<dyn ClinicService>) -> ClinicPipelineBuilder {
        ClinicPipelineBuilder::new(backend)
    }

    /// Run one call through every layer.
    ///
    /// # Errors
    ///
    /// Returns the rejection of a policy, or the error of the business
    /// method once retries are exhausted.
    pub async fn invoke(
        &self,
        call: ClinicCall,
        context: RequestContext,
    ) -> Result<ClinicReply, ClinicError> {
        self.stack
            .clone()
            .oneshot(Invocation::new(call, context))
            .await
    }

    /// The facade as seen by one caller.
    #[must_use]
    pub fn with_context(&self, context: RequestContext) -> ContextualClinic {
        ContextualClinic {
            pipeline: self.clone(),
            context,
        }
    }

    /// Circuit breaker instance called `name`, if bound to any operation.
    #[must_use]
    pub fn circuit_breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.circuit_breakers.get(name)
    }

    /// Rate limiter instance called `name`, if bound to any operation.
    #[must_use]
    pub fn rate_limiter(&self, name: &str) -> Option<Arc<RateLimiter>> {
        self.rate_limiters.get(name)
    }

    /// Cache called `name`, if bound to any operation.
    #[must_use]
    pub fn cache(&self, name: &str) -> Option<Arc<ReplyCache>> {
        self.caches.get(name).cloned()
    }

    /// The resolved bindings.
    #[must_use]
    pub fn bindings(&self) -> &PolicyBindings {
        &self.bindings
    }
}

/// [`ClinicService`] view of the pipeline for one request context.
#[derive(Clone, Debug)]
pub struct ContextualClinic {
    pipeline: ClinicPipeline,
    context: RequestContext,
}

impl ContextualClinic {
    /// Context attached to every call.
    #[must_use]
    pub const fn context(&self) -> &RequestContext {
        &self.context
    }

    async fn invoke(&self, call: ClinicCall) -> Result<ClinicReply, ClinicError> {
        self.pipeline.invoke(call, self.context.clone()).await
    }
}

fn mismatch(operation: OperationName, reply: &ClinicReply) -> ClinicError {
    ClinicError::internal(format!("{operation} answered with {}", reply.kind()))
}

#[async_trait]
impl ClinicService for ContextualClinic {
    async fn find_vets(&self) -> Result<Vec<Vet>, ClinicError> {
        match self.invoke(ClinicCall::FindVets).await? {
            ClinicReply::Vets(vets) => Ok(vets),
            other => Err(mismatch(OperationName::FindVets, &other)),
        }
    }

    async fn find_pet_types(&self) -> Result<Vec<PetType>, ClinicError> {
        match self.invoke(ClinicCall::FindPetTypes).await? {
            ClinicReply::PetTypes(types) => Ok(types),
            other => Err(mismatch(OperationName::FindPetTypes, &other)),
        }
    }

    async fn find_owner_by_id(&self, id: i64) -> Result<Option<Owner>, ClinicError> {
        match self.invoke(ClinicCall::FindOwnerById(id)).await? {
            ClinicReply::MaybeOwner(owner) => Ok(owner),
            other => Err(mismatch(OperationName::FindOwnerById, &other)),
        }
    }

    async fn find_owner_by_last_name(
        &self,
        last_name: String,
        page: PageRequest,
    ) -> Result<Page<Owner>, ClinicError> {
        match self
            .invoke(ClinicCall::FindOwnerByLastName { last_name, page })
            .await?
        {
            ClinicReply::Owners(owners) => Ok(owners),
            other => Err(mismatch(OperationName::FindOwnerByLastName, &other)),
        }
    }

    async fn find_pet_by_id(&self, id: i64) -> Result<Pet, ClinicError> {
        match self.invoke(ClinicCall::FindPetById(id)).await? {
            ClinicReply::Pet(pet) => Ok(pet),
            other => Err(mismatch(OperationName::FindPetById, &other)),
        }
    }

    async fn save_owner(&self, owner: Owner) -> Result<Owner, ClinicError> {
        match self.invoke(ClinicCall::SaveOwner(owner)).await? {
            ClinicReply::Owner(owner) => Ok(owner),
            other => Err(mismatch(OperationName::SaveOwner, &other)),
        }
    }

    async fn save_pet(&self, pet: Pet) -> Result<Pet, ClinicError> {
        match self.invoke(ClinicCall::SavePet(pet)).await? {
            ClinicReply::Pet(pet) => Ok(pet),
            other => Err(mismatch(OperationName::SavePet, &other)),
        }
    }

    async fn save_visit(&self, visit: Visit) -> Result<Visit, ClinicError> {
        match self.invoke(ClinicCall::SaveVisit(visit)).await? {
            ClinicReply::Visit(visit) => Ok(visit),
            other => Err(mismatch(OperationName::SaveVisit, &other)),
        }
    }
}

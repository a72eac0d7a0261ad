//! Integration tests for the assembled interception pipeline.
//!
//! Every test runs on a paused clock so waits in the limiter, breaker,
//! retry and cache are exact.

mod common;

use clinic::domain::{Owner, Pet};
use clinic::observability::PipelineMetrics;
use clinic::pipeline::bindings::{OperationPolicy, VETS_CACHE};
use clinic::pipeline::{ClinicPipeline, PolicyBindings};
use clinic::{ClinicCall, ClinicService, InMemoryClinic, OperationName};
use clinic_common::metrics::{OWNERS_CREATED, VISITS_CREATED};
use clinic_common::{
    AuditAction, CircuitState, ClinicError, RateLimiterConfig, RequestContext, RetryConfig,
};
use common::{GEORGE_ID, Harness, LEO_ID, checkup, sherlock};
use futures::future::join_all;
use prometheus::Registry;
use std::sync::Arc;
use std::time::Duration;
use test_utils::fixtures::{
    ADMIN_PRINCIPAL, admin_context, anonymous_context, context_with_correlation,
    tight_rate_limiter_config,
};
use test_utils::mocks::MockAuditStore;
use tokio::time::{Instant, advance, timeout};

fn single_attempt() -> RetryConfig {
    RetryConfig::default().with_max_attempts(1)
}

fn db_down() -> ClinicError {
    ClinicError::unavailable("database down")
}

// ============================================================================
// Circuit breaker
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_circuit_opens_and_short_circuits() {
    let h = Harness::with(|b| b.retry(single_attempt()));
    h.backend.fail_next(OperationName::FindPetById, 4, db_down);
    let clinic = h.pipeline.with_context(anonymous_context());

    for _ in 0..4 {
        let result = clinic.find_pet_by_id(LEO_ID).await;
        assert!(matches!(result, Err(ClinicError::Unavailable(_))));
    }

    let breaker = h.pipeline.circuit_breaker("default").unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);

    let err = clinic.find_pet_by_id(LEO_ID).await.unwrap_err();
    assert!(matches!(err, ClinicError::CircuitOpen { .. }));
    assert_eq!(h.backend.calls(OperationName::FindPetById), 4);

    // Operations bound to the same circuit share its state.
    let err = clinic.find_owner_by_id(GEORGE_ID).await.unwrap_err();
    assert!(matches!(err, ClinicError::CircuitOpen { .. }));
    assert_eq!(h.backend.calls(OperationName::FindOwnerById), 0);
}

#[tokio::test(start_paused = true)]
async fn test_circuit_stays_closed_below_threshold() {
    let h = Harness::with(|b| b.retry(single_attempt()));
    h.backend.fail_next(OperationName::FindPetById, 1, db_down);
    let clinic = h.pipeline.with_context(anonymous_context());

    assert!(clinic.find_pet_by_id(LEO_ID).await.is_err());
    for _ in 0..3 {
        clinic.find_pet_by_id(LEO_ID).await.unwrap();
    }

    let breaker = h.pipeline.circuit_breaker("default").unwrap();
    assert_eq!(breaker.buffered_calls(), 4);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_trial_success_closes() {
    let h = Harness::with(|b| b.retry(single_attempt()));
    h.backend.fail_next(OperationName::FindPetById, 4, db_down);
    let clinic = h.pipeline.with_context(anonymous_context());
    for _ in 0..4 {
        let _ = clinic.find_pet_by_id(LEO_ID).await;
    }
    let breaker = h.pipeline.circuit_breaker("default").unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);

    advance(Duration::from_secs(1)).await;

    let pet = clinic.find_pet_by_id(LEO_ID).await.unwrap();
    assert_eq!(pet.name, "Leo");
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.buffered_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_trial_failure_reopens() {
    let h = Harness::with(|b| b.retry(single_attempt()));
    h.backend.fail_next(OperationName::FindPetById, 5, db_down);
    let clinic = h.pipeline.with_context(anonymous_context());
    for _ in 0..4 {
        let _ = clinic.find_pet_by_id(LEO_ID).await;
    }

    advance(Duration::from_millis(1500)).await;

    let trial = clinic.find_pet_by_id(LEO_ID).await;
    assert!(matches!(trial, Err(ClinicError::Unavailable(_))));
    let breaker = h.pipeline.circuit_breaker("default").unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);

    // The wait restarts from the failed trial call.
    let err = clinic.find_pet_by_id(LEO_ID).await.unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::from_secs(1)));
    assert_eq!(h.backend.calls(OperationName::FindPetById), 5);
}

#[tokio::test(start_paused = true)]
async fn test_validation_failures_do_not_trip_breaker() {
    let h = Harness::with(|b| b.retry(single_attempt()));
    let clinic = h.pipeline.with_context(anonymous_context());

    for _ in 0..8 {
        let result = clinic.find_pet_by_id(999).await;
        assert!(matches!(result, Err(ClinicError::NotFound(_))));
    }

    let breaker = h.pipeline.circuit_breaker("default").unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.buffered_calls(), 0);
}

// ============================================================================
// Rate limiter
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_rate_limiter_rejects_after_timeout() {
    let h = Harness::with(|b| b.rate_limiter(tight_rate_limiter_config(2)));
    let clinic = h.pipeline.with_context(anonymous_context());

    clinic.find_owner_by_id(GEORGE_ID).await.unwrap();
    clinic.find_owner_by_id(GEORGE_ID).await.unwrap();

    let started = Instant::now();
    let err = clinic.find_owner_by_id(GEORGE_ID).await.unwrap_err();
    assert!(matches!(err, ClinicError::RateLimited { .. }));
    assert!(started.elapsed() >= Duration::from_millis(25));
    assert_eq!(h.backend.calls(OperationName::FindOwnerById), 2);

    // Rejections never reach the circuit breaker window.
    let breaker = h.pipeline.circuit_breaker("default").unwrap();
    assert_eq!(breaker.buffered_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limiter_refills_next_period() {
    let h = Harness::with(|b| b.rate_limiter(tight_rate_limiter_config(1)));
    let clinic = h.pipeline.with_context(anonymous_context());

    clinic.find_owner_by_id(GEORGE_ID).await.unwrap();
    assert!(clinic.find_owner_by_id(GEORGE_ID).await.is_err());

    advance(Duration::from_secs(1)).await;
    clinic.find_owner_by_id(GEORGE_ID).await.unwrap();
    assert_eq!(h.backend.calls(OperationName::FindOwnerById), 2);
}

// ============================================================================
// Abandoned calls
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_abandoned_trial_does_not_wedge_circuit() {
    let h = Harness::with(|b| b.retry(single_attempt()));
    h.backend.fail_next(OperationName::FindPetById, 4, db_down);
    let clinic = h.pipeline.with_context(anonymous_context());
    for _ in 0..4 {
        let _ = clinic.find_pet_by_id(LEO_ID).await;
    }
    advance(Duration::from_secs(1)).await;

    h.backend.set_latency(Duration::from_secs(60));
    let abandoned = timeout(
        Duration::from_millis(10),
        h.pipeline
            .invoke(ClinicCall::FindPetById(LEO_ID), anonymous_context()),
    )
    .await;
    assert!(abandoned.is_err());
    let breaker = h.pipeline.circuit_breaker("default").unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    h.backend.set_latency(Duration::ZERO);
    advance(Duration::from_secs(3600)).await;
    let pet = clinic.find_pet_by_id(LEO_ID).await.unwrap();
    assert_eq!(pet.name, "Leo");
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_limiter_waiter_frees_its_slot() {
    let patient = RateLimiterConfig::default()
        .with_limit_for_period(1)
        .with_limit_refresh_period(Duration::from_secs(1))
        .with_timeout_duration(Duration::from_secs(2));
    let h = Harness::with(|b| b.rate_limiter(patient));
    let clinic = h.pipeline.with_context(anonymous_context());

    clinic.find_owner_by_id(GEORGE_ID).await.unwrap();
    let abandoned = timeout(
        Duration::from_millis(10),
        h.pipeline
            .invoke(ClinicCall::FindOwnerById(GEORGE_ID), anonymous_context()),
    )
    .await;
    assert!(abandoned.is_err());
    let limiter = h.pipeline.rate_limiter("default").unwrap();
    assert_eq!(limiter.waiting_callers(), 0);

    let started = Instant::now();
    clinic.find_owner_by_id(GEORGE_ID).await.unwrap();
    assert_eq!(started.elapsed(), Duration::from_millis(990));
    assert_eq!(h.backend.calls(OperationName::FindOwnerById), 2);
}

// ============================================================================
// Retry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_transient_failures() {
    let h = Harness::new();
    h.backend.fail_next(OperationName::FindOwnerById, 2, db_down);
    let clinic = h.pipeline.with_context(anonymous_context());

    let started = Instant::now();
    let owner = clinic.find_owner_by_id(GEORGE_ID).await.unwrap().unwrap();
    assert_eq!(owner.last_name, "Franklin");
    assert_eq!(h.backend.calls(OperationName::FindOwnerById), 3);
    assert!(started.elapsed() >= Duration::from_millis(20));

    // One outcome per call, whatever the number of attempts.
    let breaker = h.pipeline.circuit_breaker("default").unwrap();
    assert_eq!(breaker.buffered_calls(), 1);
    assert!(breaker.failure_rate().abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn test_retry_surfaces_last_failure_after_max_attempts() {
    let h = Harness::new();
    h.backend.fail_next(OperationName::FindOwnerById, 5, db_down);
    let clinic = h.pipeline.with_context(anonymous_context());

    let result = clinic.find_owner_by_id(GEORGE_ID).await;
    assert!(matches!(result, Err(ClinicError::Unavailable(_))));
    assert_eq!(h.backend.calls(OperationName::FindOwnerById), 3);
}

#[tokio::test(start_paused = true)]
async fn test_validation_errors_not_retried() {
    let h = Harness::new();
    let clinic = h.pipeline.with_context(anonymous_context());

    let result = clinic.find_pet_by_id(999).await;
    assert!(matches!(result, Err(ClinicError::NotFound(_))));
    assert_eq!(h.backend.calls(OperationName::FindPetById), 1);
}

#[tokio::test(start_paused = true)]
async fn test_saves_are_not_retried() {
    let h = Harness::new();
    h.backend.fail_next(OperationName::SaveOwner, 1, db_down);
    let clinic = h.pipeline.with_context(anonymous_context());

    let result = clinic.save_owner(sherlock()).await;
    assert!(matches!(result, Err(ClinicError::Unavailable(_))));
    assert_eq!(h.backend.calls(OperationName::SaveOwner), 1);
}

// ============================================================================
// Result cache
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cache_computes_once_before_expiry() {
    let h = Harness::new();
    let clinic = h.pipeline.with_context(anonymous_context());

    let first = clinic.find_vets().await.unwrap();
    let second = clinic.find_vets().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(h.backend.calls(OperationName::FindVets), 1);

    let stats = h.pipeline.cache(VETS_CACHE).unwrap().stats();
    assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));

    advance(Duration::from_secs(61)).await;
    clinic.find_vets().await.unwrap();
    assert_eq!(h.backend.calls(OperationName::FindVets), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cache_keeps_separate_key_spaces() {
    let h = Harness::new();
    let clinic = h.pipeline.with_context(anonymous_context());

    clinic.find_vets().await.unwrap();
    clinic.find_pet_types().await.unwrap();
    clinic.find_pet_types().await.unwrap();

    assert_eq!(h.backend.calls(OperationName::FindVets), 1);
    assert_eq!(h.backend.calls(OperationName::FindPetTypes), 1);
    assert_eq!(h.pipeline.cache("petTypes").unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_not_cached() {
    let h = Harness::with(|b| b.retry(single_attempt()));
    h.backend.fail_next(OperationName::FindPetTypes, 1, db_down);
    let clinic = h.pipeline.with_context(anonymous_context());

    assert!(clinic.find_pet_types().await.is_err());
    clinic.find_pet_types().await.unwrap();
    clinic.find_pet_types().await.unwrap();
    assert_eq!(h.backend.calls(OperationName::FindPetTypes), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_misses_compute_once() {
    let h = Harness::new();
    let clinic = h.pipeline.with_context(anonymous_context());

    let results = join_all((0..10).map(|_| clinic.find_vets())).await;
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(h.backend.calls(OperationName::FindVets), 1);
}

#[tokio::test(start_paused = true)]
async fn test_mutation_invalidates_bound_cache() {
    let bindings = PolicyBindings::default().bind(
        OperationName::SaveOwner,
        OperationPolicy::default().invalidating(VETS_CACHE),
    );
    let h = Harness::with(|b| b.bindings(bindings));
    let clinic = h.pipeline.with_context(anonymous_context());

    clinic.find_vets().await.unwrap();
    clinic.find_vets().await.unwrap();
    clinic.save_owner(sherlock()).await.unwrap();
    clinic.find_vets().await.unwrap();

    assert_eq!(h.backend.calls(OperationName::FindVets), 2);
}

#[tokio::test(start_paused = true)]
async fn test_default_saves_leave_reference_data_cached() {
    let h = Harness::new();
    let clinic = h.pipeline.with_context(anonymous_context());

    clinic.find_vets().await.unwrap();
    clinic.save_owner(sherlock()).await.unwrap();
    clinic.find_vets().await.unwrap();

    assert_eq!(h.backend.calls(OperationName::FindVets), 1);
}

// ============================================================================
// Audit
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_save_owner_records_create_then_update() {
    let h = Harness::new();
    let clinic = h
        .pipeline
        .with_context(context_with_correlation("req-42").with_principal(ADMIN_PRINCIPAL));

    let saved = clinic.save_owner(sherlock()).await.unwrap();
    let records = h.audit.records();
    assert_eq!(records.len(), 1);
    let created = &records[0];
    assert_eq!(created.action, AuditAction::Create);
    assert_eq!(created.entity_type, "Owner");
    assert_eq!(created.entity_id, saved.id);
    assert_eq!(created.principal, "admin");
    assert_eq!(created.correlation_id.as_deref(), Some("req-42"));
    assert_eq!(created.snapshot["address"], "******");
    assert_eq!(created.snapshot["telephone"], "XXX-XXX-4567");

    let moved = Owner {
        city: "Brighton".to_string(),
        ..saved
    };
    clinic.save_owner(moved).await.unwrap();
    let records = h.audit.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].action, AuditAction::Update);
    assert_eq!(records[1].entity_id, records[0].entity_id);
}

#[tokio::test(start_paused = true)]
async fn test_failed_save_is_not_audited() {
    let h = Harness::new();
    let clinic = h.pipeline.with_context(admin_context());

    let nameless = Owner::new("Mycroft", "", "Diogenes Club", "London", "5550001111");
    let result = clinic.save_owner(nameless).await;
    assert!(matches!(result, Err(ClinicError::InvalidInput(_))));

    h.backend.fail_next(OperationName::SaveOwner, 1, db_down);
    assert!(clinic.save_owner(sherlock()).await.is_err());

    assert_eq!(h.audit.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_anonymous_principal_recorded() {
    let h = Harness::new();
    let clinic = h.pipeline.with_context(RequestContext::new());

    clinic.save_visit(checkup(LEO_ID)).await.unwrap();
    let records = h.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entity_type, "Visit");
    assert_eq!(records[0].principal, "anonymous");
    assert_eq!(records[0].correlation_id, None);
}

#[tokio::test(start_paused = true)]
async fn test_pet_save_audited_with_assigned_id() {
    let h = Harness::new();
    let clinic = h.pipeline.with_context(admin_context());
    let cat = clinic.find_pet_types().await.unwrap().remove(1);
    let birth = chrono::NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();

    let saved = clinic
        .save_pet(Pet::new("Toby", birth, cat, GEORGE_ID))
        .await
        .unwrap();
    let records = h.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, AuditAction::Create);
    assert_eq!(records[0].entity_id, saved.id);
}

#[tokio::test(start_paused = true)]
async fn test_audit_store_failure_is_swallowed() {
    let h = Harness::over(Arc::new(MockAuditStore::failing()), |b| b);
    let clinic = h.pipeline.with_context(admin_context());

    let saved = clinic.save_owner(sherlock()).await.unwrap();
    assert!(saved.id.is_some());
    assert_eq!(h.audit.attempts(), 1);
    assert_eq!(h.audit.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_audit_resumes_when_store_recovers() {
    let h = Harness::new();
    let clinic = h.pipeline.with_context(admin_context());

    h.audit.set_failing(true);
    let owner = clinic.save_owner(sherlock()).await.unwrap();
    h.audit.set_failing(false);
    clinic.save_owner(owner).await.unwrap();

    let records = h.audit.records();
    assert_eq!(h.audit.attempts(), 2);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, AuditAction::Update);
}

#[tokio::test(start_paused = true)]
async fn test_reads_are_not_audited() {
    let h = Harness::new();
    let clinic = h.pipeline.with_context(admin_context());

    clinic.find_owner_by_id(GEORGE_ID).await.unwrap();
    clinic.find_vets().await.unwrap();
    assert_eq!(h.audit.attempts(), 0);
}

// ============================================================================
// Business metrics
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_counters_follow_successful_saves() {
    let h = Harness::new();
    let clinic = h.pipeline.with_context(admin_context());

    let owner = clinic.save_owner(sherlock()).await.unwrap();
    clinic.save_owner(owner).await.unwrap();
    clinic.save_visit(checkup(LEO_ID)).await.unwrap();

    assert_eq!(h.metrics.count(OWNERS_CREATED), 2);
    assert_eq!(h.metrics.count(VISITS_CREATED), 1);
    assert_eq!(h.metrics.increments().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_saves_not_counted() {
    let h = Harness::new();
    let clinic = h.pipeline.with_context(admin_context());

    let result = clinic.save_visit(checkup(999)).await;
    assert!(matches!(result, Err(ClinicError::NotFound(_))));
    assert!(h.metrics.increments().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pipeline_metrics_by_outcome() {
    let metrics = Arc::new(PipelineMetrics::new(&Registry::new()).unwrap());
    let h = Harness::with(|b| b.pipeline_metrics(Some(metrics.clone())));
    let clinic = h.pipeline.with_context(anonymous_context());

    clinic.find_vets().await.unwrap();
    clinic.find_vets().await.unwrap();
    let _ = clinic.find_pet_by_id(999).await;

    assert_eq!(metrics.call_count("findVets", "success"), 2);
    assert_eq!(metrics.call_count("findPetById", "validation"), 1);
}

// ============================================================================
// Facade
// ============================================================================

#[tokio::test]
async fn test_contextual_clinic_is_a_clinic_service() {
    let pipeline = ClinicPipeline::builder(Arc::new(InMemoryClinic::seeded())).build();
    let clinic: Arc<dyn ClinicService> = Arc::new(pipeline.with_context(RequestContext::new()));

    let page = clinic
        .find_owner_by_last_name("Davis".to_string(), clinic::domain::PageRequest::new(0, 1))
        .await
        .unwrap();
    assert_eq!(page.content.len(), 1);
    assert_eq!(page.total_elements, 2);
    assert_eq!(page.total_pages(), 2);
}

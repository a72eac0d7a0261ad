//! Pet Clinic Service - Main Entry Point
//!
//! Wires configuration, logging and sinks around the in-memory clinic, then
//! drives a short scripted workload through the pipeline and reports the
//! audit trail and counters.

use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clinic::domain::{Owner, PageRequest, Pet, Visit};
use clinic::observability::{Observability, init_logging};
use clinic::{ClinicPipeline, ClinicService, Config, ErrorResponse, InMemoryClinic};
use clinic_common::metrics::{OWNERS_CREATED, VISITS_CREATED};
use clinic_common::{AuditStore, ClinicError, InMemoryAuditStore, NoopAuditStore, RequestContext};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("invalid configuration")?;
    init_logging(&config);

    info!(service = %config.service_name, "Starting pet clinic service");

    let observability =
        Observability::from_config(&config).context("failed to build metrics sinks")?;
    let audit_log = Arc::new(InMemoryAuditStore::new());
    let audit_store: Arc<dyn AuditStore> = if config.audit_enabled {
        audit_log.clone()
    } else {
        Arc::new(NoopAuditStore)
    };

    let pipeline = ClinicPipeline::builder(Arc::new(InMemoryClinic::seeded()))
        .with_config(&config)
        .audit_store(audit_store)
        .metrics_sink(observability.business.sink())
        .pipeline_metrics(observability.pipeline.clone())
        .build();

    let ctx = RequestContext::generated().with_principal("admin");
    let clinic = pipeline.with_context(ctx.clone());

    run_workload(&clinic)
        .await
        .unwrap_or_else(|err| {
            let response = ErrorResponse::from_error(&err, ctx.correlation_id.as_deref());
            warn!(code = %response.code.as_str(), status = response.http_status(), "Workload stopped");
        });

    for record in audit_log.records() {
        info!(
            action = %record.action,
            entity_type = %record.entity_type,
            entity_id = ?record.entity_id,
            principal = %record.principal,
            snapshot = %record.snapshot,
            "Audit trail"
        );
    }
    info!(
        owners_created = observability.business.count(OWNERS_CREATED),
        visits_created = observability.business.count(VISITS_CREATED),
        "Business counters"
    );
    if let Some(text) = observability.exposition()? {
        info!(metrics = %text, "Prometheus exposition");
    }

    info!("Pet clinic service stopped");
    Ok(())
}

async fn run_workload(clinic: &dyn ClinicService) -> Result<(), ClinicError> {
    let vets = clinic.find_vets().await?;
    let types = clinic.find_pet_types().await?;
    info!(vets = vets.len(), pet_types = types.len(), "Reference data loaded");

    let owner = clinic
        .save_owner(Owner::new(
            "Jean",
            "Coleman",
            "105 N. Lake St.",
            "Monona",
            "6085552654",
        ))
        .await?;
    let owner_id = owner.id.unwrap_or_default();

    let pet_type = types
        .into_iter()
        .next()
        .ok_or_else(|| ClinicError::not_found("no pet types"))?;
    let birth = NaiveDate::from_ymd_opt(2021, 4, 2).unwrap_or_default();
    let pet = clinic
        .save_pet(Pet::new("Max", birth, pet_type, owner_id))
        .await?;

    let today = chrono::Utc::now().date_naive();
    clinic
        .save_visit(Visit::new(today, "annual checkup", pet.id.unwrap_or_default()))
        .await?;

    let renamed = Owner {
        city: "Madison".to_string(),
        ..owner
    };
    clinic.save_owner(renamed).await?;

    let page = clinic
        .find_owner_by_last_name("Coleman".to_string(), PageRequest::default())
        .await?;
    info!(matches = page.total_elements, "Owner search finished");
    Ok(())
}

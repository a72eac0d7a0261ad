//! Append-only audit trail for mutating calls.
//!
//! An [`AuditRecorder`] turns a successfully saved entity into an
//! [`AuditRecord`] and hands it to an [`AuditStore`]. Store failures never
//! reach the caller: they are logged and the business result stands.

use crate::context::RequestContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

/// Kind of change recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    /// The entity had no identity before the call
    Create,
    /// The entity already existed
    Update,
}

impl AuditAction {
    /// Action implied by the entity as it was before being saved.
    #[must_use]
    pub fn for_entity(entity: &(impl Auditable + ?Sized)) -> Self {
        if entity.is_new() {
            Self::Create
        } else {
            Self::Update
        }
    }

    /// Upper-case name, as persisted.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain entity whose changes are audited.
pub trait Auditable {
    /// Entity type name, e.g. `"Owner"`.
    fn entity_type(&self) -> &'static str;

    /// Persistent identity, `None` before the first save.
    fn entity_id(&self) -> Option<i64>;

    /// JSON snapshot of the entity with PII masked.
    fn audit_snapshot(&self) -> serde_json::Value;

    /// Check if the entity has never been saved.
    fn is_new(&self) -> bool {
        self.entity_id().is_none()
    }
}

/// One audited change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record id
    pub id: Uuid,
    /// Entity type name
    pub entity_type: String,
    /// Entity id as assigned by the save
    pub entity_id: Option<i64>,
    /// Create or update
    pub action: AuditAction,
    /// Acting principal, `"anonymous"` when unauthenticated
    pub principal: String,
    /// When the change was recorded
    pub timestamp: DateTime<Utc>,
    /// Correlation id of the request that made the change
    pub correlation_id: Option<String>,
    /// Masked entity snapshot
    pub snapshot: serde_json::Value,
}

impl AuditRecord {
    /// Build a record for `saved`, the entity as returned by the save.
    #[must_use]
    pub fn new(action: AuditAction, saved: &(impl Auditable + ?Sized), ctx: &RequestContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type: saved.entity_type().to_string(),
            entity_id: saved.entity_id(),
            action,
            principal: ctx.principal_or_anonymous().to_string(),
            timestamp: Utc::now(),
            correlation_id: ctx.correlation_id.clone(),
            snapshot: saved.audit_snapshot(),
        }
    }
}

/// Audit persistence errors.
#[derive(Error, Debug)]
pub enum AuditError {
    /// Backing store cannot be reached
    #[error("Audit store unavailable: {0}")]
    StoreUnavailable(String),

    /// Record refused by the store
    #[error("Audit record rejected: {0}")]
    Rejected(String),
}

/// Append-only audit persistence.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist one record.
    async fn store(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Audit store keeping records in memory.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored record, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check if no record was stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn store(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.records.write().push(record);
        Ok(())
    }
}

/// Audit store that discards records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditStore;

#[async_trait]
impl AuditStore for NoopAuditStore {
    async fn store(&self, _record: AuditRecord) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Records successful mutations into an [`AuditStore`].
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
}

impl fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditRecorder").finish_non_exhaustive()
    }
}

impl AuditRecorder {
    /// Create a recorder writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Build and persist the record of one successful save.
    ///
    /// Store failures are logged at error level and otherwise ignored.
    pub async fn record(
        &self,
        action: AuditAction,
        saved: &(impl Auditable + Sync + ?Sized),
        ctx: &RequestContext,
    ) {
        let record = AuditRecord::new(action, saved, ctx);
        let entity_type = record.entity_type.clone();
        let entity_id = record.entity_id;

        match self.store.store(record).await {
            Ok(()) => info!(
                entity_type = %entity_type,
                entity_id = ?entity_id,
                action = %action,
                "Audit record stored"
            ),
            Err(e) => error!(
                entity_type = %entity_type,
                entity_id = ?entity_id,
                action = %action,
                correlation_id = %ctx.correlation_id_or_dash(),
                error = %e,
                "Failed to store audit record"
            ),
        }
    }
}

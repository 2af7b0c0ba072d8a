//! Persistence and audit collaborators.
//!
//! The engine never owns storage. It reads and writes through these traits;
//! `db::Db` backs them with Postgres and [`memory::MemoryStore`] keeps
//! everything in-process.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::event::TicketEvent;
use crate::model::*;

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>>;

    /// Atomically upsert `ticket` and append `events`.
    ///
    /// The stored version must equal `ticket.version` (a brand-new ticket
    /// carries version 0), otherwise nothing is written and
    /// [`crate::error::Error::Conflict`] is returned. Returns the saved
    /// ticket with its version incremented.
    async fn persist(&self, ticket: &Ticket, events: &[TicketEvent]) -> Result<Ticket>;

    /// Tickets whose `due_at <= until` and whose status is neither
    /// `Completed` nor `Closed`.
    async fn tickets_due_by(&self, until: DateTime<Utc>) -> Result<Vec<Ticket>>;

    /// Timeline of a ticket, oldest first.
    async fn ticket_events(&self, ticket: TicketId) -> Result<Vec<TicketEvent>>;

    async fn get_plan(&self, id: PlanId) -> Result<Option<SlaPlan>>;

    async fn active_plans(&self, tenant: TenantId) -> Result<Vec<SlaPlan>>;

    /// Enabled rules for `(tenant, trigger)`, ascending by rule priority.
    async fn enabled_rules(&self, tenant: TenantId, trigger: Trigger)
    -> Result<Vec<AutomationRule>>;

    async fn touch_rule(&self, id: RuleId, at: DateTime<Utc>) -> Result<()>;

    /// User holding the department-manager role for `(tenant, department)`.
    async fn department_manager(
        &self,
        tenant: TenantId,
        department: DepartmentId,
    ) -> Result<Option<UserId>>;
}

/// One audit-log entry. `actor == None` means the system acted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub tenant_id: TenantId,
    pub actor: Option<UserId>,
    pub role: String,
    pub entity: String,
    pub entity_id: uuid::Uuid,
    pub action: String,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl AuditRecord {
    /// Record of an automatic (system) action on a ticket.
    pub fn system(
        ticket: &Ticket,
        action: impl Into<String>,
        before: serde_json::Value,
        after: serde_json::Value,
    ) -> Self {
        Self {
            tenant_id: ticket.tenant_id,
            actor: None,
            role: "system".to_string(),
            entity: "ticket".to_string(),
            entity_id: ticket.id.0,
            action: action.into(),
            before,
            after,
            at: Utc::now(),
        }
    }
}

/// Best-effort audit trail. Callers log failures and carry on.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log(&self, record: AuditRecord) -> Result<()>;
}

/// Write an audit record, downgrading failure to a warning.
pub(crate) async fn audit_best_effort(sink: &dyn AuditSink, record: AuditRecord) {
    let entity_id = record.entity_id;
    let action = record.action.clone();
    if let Err(e) = sink.log(record).await {
        tracing::warn!(%entity_id, action, "audit log failed: {e}");
    }
}

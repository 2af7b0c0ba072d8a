//! Row shapes and their conversion into model types.
//!
//! Enum columns are stored as their snake_case text; structured columns
//! (`escalation_policy`, `condition`, `actions`) as JSONB validated on
//! write. They are still parsed leniently here so rows written before a
//! format change load as `Malformed` instead of failing the whole query.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::event::{EventKind, TicketEvent, Visibility};
use crate::model::*;

#[derive(Debug, sqlx::FromRow)]
pub(super) struct TicketRow {
    id: Uuid,
    tenant_id: Uuid,
    subject: String,
    status: String,
    priority: String,
    assignee: Option<Uuid>,
    department: Option<Uuid>,
    category: Option<Uuid>,
    sla_plan: Option<Uuid>,
    sla_plan_explicit: bool,
    tags: Vec<String>,
    source: String,
    due_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_event_at: DateTime<Utc>,
    version: i64,
}

pub(super) const TICKET_COLUMNS: &str = "id, tenant_id, subject, status, priority, assignee, \
     department, category, sla_plan, sla_plan_explicit, tags, source, due_at, closed_at, \
     created_at, updated_at, last_event_at, version";

impl TicketRow {
    pub(super) fn try_into_ticket(self) -> Result<Ticket> {
        Ok(Ticket {
            id: TicketId(self.id),
            tenant_id: TenantId(self.tenant_id),
            subject: self.subject,
            status: Status::from_str(&self.status)?,
            priority: Priority::from_str(&self.priority)?,
            assignee: self.assignee.map(UserId),
            department: self.department.map(DepartmentId),
            category: self.category.map(CategoryId),
            sla_plan: self.sla_plan.map(PlanId),
            sla_plan_explicit: self.sla_plan_explicit,
            tags: self.tags.into_iter().collect(),
            source: TicketSource::from_str(&self.source)?,
            due_at: self.due_at,
            closed_at: self.closed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_event_at: self.last_event_at,
            version: self.version,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct EventRow {
    id: Uuid,
    ticket_id: Uuid,
    tenant_id: Uuid,
    actor: Option<Uuid>,
    visibility: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl EventRow {
    pub(super) fn try_into_event(self) -> Result<TicketEvent> {
        Ok(TicketEvent {
            id: EventId(self.id),
            ticket_id: TicketId(self.ticket_id),
            tenant_id: TenantId(self.tenant_id),
            actor: self.actor.map(UserId),
            visibility: Visibility::from_str(&self.visibility)?,
            kind: serde_json::from_value::<EventKind>(self.payload)?,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct PlanRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    response_time_minutes: i32,
    resolution_time_minutes: i32,
    calendar_mode: String,
    escalation_policy: Option<serde_json::Value>,
    active: bool,
}

impl PlanRow {
    pub(super) fn try_into_plan(self) -> Result<SlaPlan> {
        Ok(SlaPlan {
            id: PlanId(self.id),
            tenant_id: TenantId(self.tenant_id),
            name: self.name,
            response_time_minutes: i64::from(self.response_time_minutes),
            resolution_time_minutes: i64::from(self.resolution_time_minutes),
            calendar: CalendarMode::from_str(&self.calendar_mode)?,
            escalation_policy: self
                .escalation_policy
                .filter(|raw| !raw.is_null())
                .map(Parsed::from_value),
            active: self.active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct RuleRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    trigger: String,
    condition: Option<serde_json::Value>,
    actions: serde_json::Value,
    priority: i32,
    enabled: bool,
    last_run_at: Option<DateTime<Utc>>,
}

impl RuleRow {
    pub(super) fn try_into_rule(self) -> Result<AutomationRule> {
        Ok(AutomationRule {
            id: RuleId(self.id),
            tenant_id: TenantId(self.tenant_id),
            name: self.name,
            trigger: Trigger::from_str(&self.trigger)?,
            condition: self.condition.map(RuleCondition::parse),
            actions: Action::list_from_value(&self.actions),
            priority: self.priority,
            enabled: self.enabled,
            last_run_at: self.last_run_at,
        })
    }
}

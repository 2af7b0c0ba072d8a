//! [`TicketStore`] and [`AuditSink`] over Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Db;
use super::rows::{EventRow, PlanRow, RuleRow, TICKET_COLUMNS, TicketRow};
use crate::error::{Error, Result};
use crate::event::TicketEvent;
use crate::model::*;
use crate::store::{AuditRecord, AuditSink, TicketStore};

const PLAN_COLUMNS: &str = "id, tenant_id, name, response_time_minutes, resolution_time_minutes, \
     calendar_mode, escalation_policy, active";

const RULE_COLUMNS: &str =
    "id, tenant_id, name, trigger, condition, actions, priority, enabled, last_run_at";

/// Role name that marks a user as a department's manager.
pub const DEPARTMENT_MANAGER_ROLE: &str = "department_manager";

#[async_trait]
impl TicketStore for Db {
    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        let row: Option<TicketRow> =
            sqlx::query_as(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;
        row.map(TicketRow::try_into_ticket).transpose()
    }

    async fn persist(&self, ticket: &Ticket, events: &[TicketEvent]) -> Result<Ticket> {
        let mut tx = self.pool().begin().await?;
        let tags: Vec<String> = ticket.tags.iter().cloned().collect();

        let written = if ticket.version == 0 {
            sqlx::query(
                "INSERT INTO tickets (id, tenant_id, subject, status, priority, assignee, department, category,
                                      sla_plan, sla_plan_explicit, tags, source, due_at, closed_at,
                                      created_at, updated_at, last_event_at, version)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, 1)
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(ticket.id.0)
            .bind(ticket.tenant_id.0)
            .bind(&ticket.subject)
            .bind(ticket.status.to_string())
            .bind(ticket.priority.to_string())
            .bind(ticket.assignee.map(|u| u.0))
            .bind(ticket.department.map(|d| d.0))
            .bind(ticket.category.map(|c| c.0))
            .bind(ticket.sla_plan.map(|p| p.0))
            .bind(ticket.sla_plan_explicit)
            .bind(&tags)
            .bind(ticket.source.to_string())
            .bind(ticket.due_at)
            .bind(ticket.closed_at)
            .bind(ticket.created_at)
            .bind(ticket.updated_at)
            .bind(ticket.last_event_at)
            .execute(&mut *tx)
            .await?
        } else {
            sqlx::query(
                "UPDATE tickets
                 SET subject = $3, status = $4, priority = $5, assignee = $6, department = $7,
                     category = $8, sla_plan = $9, sla_plan_explicit = $10, tags = $11,
                     due_at = $12, closed_at = $13, updated_at = $14, last_event_at = $15,
                     version = version + 1
                 WHERE id = $1 AND version = $2",
            )
            .bind(ticket.id.0)
            .bind(ticket.version)
            .bind(&ticket.subject)
            .bind(ticket.status.to_string())
            .bind(ticket.priority.to_string())
            .bind(ticket.assignee.map(|u| u.0))
            .bind(ticket.department.map(|d| d.0))
            .bind(ticket.category.map(|c| c.0))
            .bind(ticket.sla_plan.map(|p| p.0))
            .bind(ticket.sla_plan_explicit)
            .bind(&tags)
            .bind(ticket.due_at)
            .bind(ticket.closed_at)
            .bind(ticket.updated_at)
            .bind(ticket.last_event_at)
            .execute(&mut *tx)
            .await?
        };

        if written.rows_affected() == 0 {
            return Err(Error::Conflict(format!(
                "ticket {} changed since version {}",
                ticket.id, ticket.version
            )));
        }

        for event in events {
            sqlx::query(
                "INSERT INTO ticket_events (id, ticket_id, tenant_id, event_type, actor, visibility, payload, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(event.id.0)
            .bind(event.ticket_id.0)
            .bind(event.tenant_id.0)
            .bind(event.event_type().to_string())
            .bind(event.actor.map(|u| u.0))
            .bind(event.visibility.to_string())
            .bind(serde_json::to_value(&event.kind)?)
            .bind(event.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let mut saved = ticket.clone();
        saved.version += 1;
        Ok(saved)
    }

    async fn tickets_due_by(&self, until: DateTime<Utc>) -> Result<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets
             WHERE due_at IS NOT NULL AND due_at <= $1
               AND status NOT IN ('completed', 'closed')
             ORDER BY due_at"
        ))
        .bind(until)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(TicketRow::try_into_ticket).collect()
    }

    async fn ticket_events(&self, ticket: TicketId) -> Result<Vec<TicketEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT id, ticket_id, tenant_id, actor, visibility, payload, created_at
             FROM ticket_events WHERE ticket_id = $1
             ORDER BY created_at, id",
        )
        .bind(ticket.0)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(EventRow::try_into_event).collect()
    }

    async fn get_plan(&self, id: PlanId) -> Result<Option<SlaPlan>> {
        let row: Option<PlanRow> =
            sqlx::query_as(&format!("SELECT {PLAN_COLUMNS} FROM sla_plans WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;
        row.map(PlanRow::try_into_plan).transpose()
    }

    async fn active_plans(&self, tenant: TenantId) -> Result<Vec<SlaPlan>> {
        let rows: Vec<PlanRow> = sqlx::query_as(&format!(
            "SELECT {PLAN_COLUMNS} FROM sla_plans
             WHERE tenant_id = $1 AND active
             ORDER BY response_time_minutes, name"
        ))
        .bind(tenant.0)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(PlanRow::try_into_plan).collect()
    }

    async fn enabled_rules(
        &self,
        tenant: TenantId,
        trigger: Trigger,
    ) -> Result<Vec<AutomationRule>> {
        let rows: Vec<RuleRow> = sqlx::query_as(&format!(
            "SELECT {RULE_COLUMNS} FROM automation_rules
             WHERE tenant_id = $1 AND trigger = $2 AND enabled
             ORDER BY priority, id"
        ))
        .bind(tenant.0)
        .bind(trigger.to_string())
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(RuleRow::try_into_rule).collect()
    }

    async fn touch_rule(&self, id: RuleId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE automation_rules SET last_run_at = $2 WHERE id = $1")
            .bind(id.0)
            .bind(at)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn department_manager(
        &self,
        tenant: TenantId,
        department: DepartmentId,
    ) -> Result<Option<UserId>> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM role_assignments
             WHERE tenant_id = $1 AND department_id = $2 AND role = $3
             ORDER BY created_at
             LIMIT 1",
        )
        .bind(tenant.0)
        .bind(department.0)
        .bind(DEPARTMENT_MANAGER_ROLE)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(|(id,)| UserId(id)))
    }
}

#[async_trait]
impl AuditSink for Db {
    async fn log(&self, record: AuditRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log (tenant_id, actor, role, entity, entity_id, action, before, after, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.tenant_id.0)
        .bind(record.actor.map(|u| u.0))
        .bind(&record.role)
        .bind(&record.entity)
        .bind(record.entity_id)
        .bind(&record.action)
        .bind(&record.before)
        .bind(&record.after)
        .bind(record.at)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

// Catalog writes. The engine only reads plans, rules and roles; these exist
// for provisioning and the integration tests.
impl Db {
    /// Store a plan. A policy that did not parse is rejected here rather
    /// than saved and skipped on every load.
    pub async fn insert_plan(&self, plan: &SlaPlan) -> Result<()> {
        let policy = match &plan.escalation_policy {
            Some(Parsed::Malformed { error, .. }) => {
                return Err(Error::MalformedPolicy(error.clone()));
            }
            Some(valid) => Some(valid.to_value()),
            None => None,
        };
        sqlx::query(
            "INSERT INTO sla_plans (id, tenant_id, name, response_time_minutes, resolution_time_minutes,
                                    calendar_mode, escalation_policy, active)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(plan.id.0)
        .bind(plan.tenant_id.0)
        .bind(&plan.name)
        .bind(minutes_column("response_time_minutes", plan.response_time_minutes)?)
        .bind(minutes_column("resolution_time_minutes", plan.resolution_time_minutes)?)
        .bind(plan.calendar.to_string())
        .bind(policy)
        .bind(plan.active)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Store a rule built from editor JSON. Rules with a malformed condition
    /// or an unrecognized action are rejected before anything is written.
    pub async fn insert_rule(&self, rule: &AutomationRule) -> Result<()> {
        rule.validate()?;
        let condition = rule.condition.as_ref().map(Parsed::to_value);
        let actions = serde_json::to_value(&rule.actions)?;
        sqlx::query(
            "INSERT INTO automation_rules (id, tenant_id, name, trigger, condition, actions,
                                           priority, enabled, last_run_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(rule.id.0)
        .bind(rule.tenant_id.0)
        .bind(&rule.name)
        .bind(rule.trigger.to_string())
        .bind(condition)
        .bind(actions)
        .bind(rule.priority)
        .bind(rule.enabled)
        .bind(rule.last_run_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn assign_role(
        &self,
        tenant: TenantId,
        user: UserId,
        role: &str,
        department: Option<DepartmentId>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO role_assignments (tenant_id, user_id, role, department_id)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(tenant.0)
        .bind(user.0)
        .bind(role)
        .bind(department.map(|d| d.0))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Audit rows for one entity, oldest first.
    pub async fn audit_records(&self, entity_id: Uuid) -> Result<Vec<AuditRecord>> {
        let rows: Vec<(
            Uuid,
            Option<Uuid>,
            String,
            String,
            Uuid,
            String,
            serde_json::Value,
            serde_json::Value,
            DateTime<Utc>,
        )> = sqlx::query_as(
            "SELECT tenant_id, actor, role, entity, entity_id, action, before, after, created_at
             FROM audit_log WHERE entity_id = $1 ORDER BY id",
        )
        .bind(entity_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(
                |(tenant_id, actor, role, entity, entity_id, action, before, after, at)| {
                    AuditRecord {
                        tenant_id: TenantId(tenant_id),
                        actor: actor.map(UserId),
                        role,
                        entity,
                        entity_id,
                        action,
                        before,
                        after,
                        at,
                    }
                },
            )
            .collect())
    }
}

fn minutes_column(column: &str, minutes: i64) -> Result<i32> {
    i32::try_from(minutes)
        .map_err(|_| Error::Other(format!("{column} out of range: {minutes}")))
}

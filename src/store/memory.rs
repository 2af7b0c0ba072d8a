//! In-process store for tests and embedded use.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{AuditRecord, AuditSink, TicketStore};
use crate::error::{Error, Result};
use crate::event::TicketEvent;
use crate::model::*;

#[derive(Default)]
struct Inner {
    tickets: HashMap<TicketId, Ticket>,
    events: Vec<TicketEvent>,
    plans: HashMap<PlanId, SlaPlan>,
    rules: HashMap<RuleId, AutomationRule>,
    managers: HashMap<(TenantId, DepartmentId), UserId>,
    audit: Vec<AuditRecord>,
    failing_writes: HashSet<TicketId>,
}

/// Everything behind one mutex; each trait call is atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a ticket as-is, bypassing the version check and the timeline.
    pub fn insert_ticket(&self, ticket: Ticket) {
        self.inner.lock().tickets.insert(ticket.id, ticket);
    }

    pub fn insert_plan(&self, plan: SlaPlan) {
        self.inner.lock().plans.insert(plan.id, plan);
    }

    pub fn insert_rule(&self, rule: AutomationRule) {
        self.inner.lock().rules.insert(rule.id, rule);
    }

    pub fn set_department_manager(&self, tenant: TenantId, department: DepartmentId, user: UserId) {
        self.inner
            .lock()
            .managers
            .insert((tenant, department), user);
    }

    /// Make every subsequent `persist` of this ticket fail.
    pub fn fail_writes_for(&self, ticket: TicketId) {
        self.inner.lock().failing_writes.insert(ticket);
    }

    pub fn rule(&self, id: RuleId) -> Option<AutomationRule> {
        self.inner.lock().rules.get(&id).cloned()
    }

    pub fn events(&self) -> Vec<TicketEvent> {
        self.inner.lock().events.clone()
    }

    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.inner.lock().audit.clone()
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        Ok(self.inner.lock().tickets.get(&id).cloned())
    }

    async fn persist(&self, ticket: &Ticket, events: &[TicketEvent]) -> Result<Ticket> {
        let mut inner = self.inner.lock();

        if inner.failing_writes.contains(&ticket.id) {
            return Err(Error::Other(format!("write rejected for ticket {}", ticket.id)));
        }

        let stored_version = inner.tickets.get(&ticket.id).map_or(0, |t| t.version);
        if stored_version != ticket.version {
            return Err(Error::Conflict(format!(
                "ticket {} is at version {stored_version}, write was based on {}",
                ticket.id, ticket.version
            )));
        }

        let mut saved = ticket.clone();
        saved.version += 1;
        inner.tickets.insert(saved.id, saved.clone());
        inner.events.extend_from_slice(events);
        Ok(saved)
    }

    async fn tickets_due_by(&self, until: DateTime<Utc>) -> Result<Vec<Ticket>> {
        let inner = self.inner.lock();
        let mut due: Vec<Ticket> = inner
            .tickets
            .values()
            .filter(|t| t.due_at.is_some_and(|d| d <= until) && !t.status.is_resolved())
            .cloned()
            .collect();
        due.sort_by_key(|t| t.due_at);
        Ok(due)
    }

    async fn ticket_events(&self, ticket: TicketId) -> Result<Vec<TicketEvent>> {
        Ok(self
            .inner
            .lock()
            .events
            .iter()
            .filter(|e| e.ticket_id == ticket)
            .cloned()
            .collect())
    }

    async fn get_plan(&self, id: PlanId) -> Result<Option<SlaPlan>> {
        Ok(self.inner.lock().plans.get(&id).cloned())
    }

    async fn active_plans(&self, tenant: TenantId) -> Result<Vec<SlaPlan>> {
        Ok(self
            .inner
            .lock()
            .plans
            .values()
            .filter(|p| p.tenant_id == tenant && p.active)
            .cloned()
            .collect())
    }

    async fn enabled_rules(
        &self,
        tenant: TenantId,
        trigger: Trigger,
    ) -> Result<Vec<AutomationRule>> {
        let mut rules: Vec<AutomationRule> = self
            .inner
            .lock()
            .rules
            .values()
            .filter(|r| r.tenant_id == tenant && r.trigger == trigger && r.enabled)
            .cloned()
            .collect();
        rules.sort_by_key(|r| (r.priority, r.id));
        Ok(rules)
    }

    async fn touch_rule(&self, id: RuleId, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock();
        let rule = inner
            .rules
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("automation rule {id}")))?;
        rule.last_run_at = Some(at);
        Ok(())
    }

    async fn department_manager(
        &self,
        tenant: TenantId,
        department: DepartmentId,
    ) -> Result<Option<UserId>> {
        Ok(self.inner.lock().managers.get(&(tenant, department)).copied())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn log(&self, record: AuditRecord) -> Result<()> {
        self.inner.lock().audit.push(record);
        Ok(())
    }
}

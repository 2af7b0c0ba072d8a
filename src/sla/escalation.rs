//! Applies a plan's escalation policy to a breached ticket.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::automation::AutomationQueue;
use crate::dispatch::{Dispatcher, EscalationNotice, TicketSummary};
use crate::error::{Error, Result};
use crate::event::{EventKind, TicketEvent, Visibility};
use crate::model::*;
use crate::store::{AuditRecord, AuditSink, TicketStore, audit_best_effort};
use crate::telemetry::metrics;
use crate::workflow::TicketLocks;

pub const INCREASE_PRIORITY: &str = "increase_priority";
pub const REASSIGN_TO_MANAGER: &str = "reassign_to_manager";
pub const NOTIFY_STAKEHOLDERS: &str = "notify_stakeholders";

pub struct EscalationExecutor {
    store: Arc<dyn TicketStore>,
    audit: Arc<dyn AuditSink>,
    dispatcher: Arc<dyn Dispatcher>,
    locks: TicketLocks,
    automation: Option<AutomationQueue>,
}

impl EscalationExecutor {
    pub fn new(
        store: Arc<dyn TicketStore>,
        audit: Arc<dyn AuditSink>,
        dispatcher: Arc<dyn Dispatcher>,
        locks: TicketLocks,
    ) -> Self {
        Self {
            store,
            audit,
            dispatcher,
            locks,
            automation: None,
        }
    }

    /// Raise `TicketUpdated` for every ticket this executor escalates.
    pub fn with_automation(mut self, queue: AutomationQueue) -> Self {
        self.automation = Some(queue);
        self
    }

    /// Policy for a ticket. Any missing or unparsable piece falls back to
    /// [`EscalationPolicy::default`], which enables every action.
    pub async fn resolve_policy(&self, ticket: &Ticket) -> Result<EscalationPolicy> {
        let Some(plan_id) = ticket.sla_plan else {
            debug!(ticket = %ticket.id, "no sla plan, using default escalation policy");
            return Ok(EscalationPolicy::default());
        };
        let Some(plan) = self.store.get_plan(plan_id).await? else {
            warn!(ticket = %ticket.id, plan = %plan_id, "sla plan missing, using default escalation policy");
            return Ok(EscalationPolicy::default());
        };
        Ok(match plan.escalation_policy {
            None => EscalationPolicy::default(),
            Some(Parsed::Valid(policy)) => policy,
            Some(Parsed::Malformed { error, .. }) => {
                let err = Error::MalformedPolicy(error);
                warn!(plan = %plan.id, name = %plan.name, "{err}, using default");
                EscalationPolicy::default()
            }
        })
    }

    /// Escalate a ticket breached as of `as_of`.
    ///
    /// Returns the `Escalation` event, or `None` when no action was enabled
    /// and eligible. In that case nothing is written: no event, no audit
    /// record, no save. A ticket that was resolved or had its due date
    /// moved since the sweep read it is skipped the same way.
    pub async fn escalate(
        &self,
        id: TicketId,
        reason: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<TicketEvent>> {
        let _guard = self.locks.lock(id).await;
        let mut ticket = self
            .store
            .get_ticket(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("ticket {id}")))?;

        if ticket.status.is_resolved() {
            debug!(ticket = %id, status = %ticket.status, "ticket resolved before escalation");
            return Ok(None);
        }
        if !ticket.due_at.is_some_and(|due| due < as_of) {
            debug!(ticket = %id, due_at = ?ticket.due_at, "ticket no longer breached");
            return Ok(None);
        }

        let policy = self.resolve_policy(&ticket).await?;
        let before = json!({ "priority": ticket.priority, "assignee": ticket.assignee });
        let mut applied: Vec<String> = Vec::new();

        if policy.increase_priority {
            if let Some(next) = ticket.priority.escalated() {
                ticket.priority = next;
                applied.push(INCREASE_PRIORITY.to_string());
            }
        }

        if policy.reassign_to_manager {
            if let Some(department) = ticket.department {
                let manager = self
                    .store
                    .department_manager(ticket.tenant_id, department)
                    .await?;
                if let Some(manager) = manager.filter(|m| ticket.assignee != Some(*m)) {
                    ticket.assignee = Some(manager);
                    applied.push(REASSIGN_TO_MANAGER.to_string());
                }
            }
        }

        // Counts as applied whatever happens to delivery.
        if policy.notify_stakeholders {
            applied.push(NOTIFY_STAKEHOLDERS.to_string());
        }

        if applied.is_empty() {
            debug!(ticket = %id, "escalation policy applied nothing");
            return Ok(None);
        }

        let now = Utc::now();
        ticket.updated_at = now;
        ticket.last_event_at = now;

        let event = TicketEvent::new(
            &ticket,
            None,
            Visibility::Internal,
            EventKind::Escalation {
                actions: applied.clone(),
                reason: reason.to_string(),
                priority: ticket.priority,
                assignee: ticket.assignee,
                policy: policy.clone(),
            },
            now,
        );
        let saved = self
            .store
            .persist(&ticket, std::slice::from_ref(&event))
            .await?;

        if policy.notify_stakeholders {
            self.dispatcher.notify_stakeholders(EscalationNotice {
                ticket: TicketSummary::from(&saved),
                reason: reason.to_string(),
                targets: policy.notification_targets.clone(),
                webhook: policy.webhook.clone(),
            });
        }

        let after = json!({
            "priority": saved.priority,
            "assignee": saved.assignee,
            "actions": &applied,
            "reason": reason,
        });
        audit_best_effort(
            self.audit.as_ref(),
            AuditRecord::system(&saved, "sla_escalation", before, after),
        )
        .await;

        for action in &applied {
            metrics::escalations().add(1, &[KeyValue::new("action", action.clone())]);
        }
        info!(
            ticket = %id,
            tenant = %saved.tenant_id,
            actions = ?applied,
            priority = %saved.priority,
            reason,
            "ticket escalated"
        );

        if let Some(queue) = &self.automation {
            queue.enqueue(id, Trigger::TicketUpdated);
        }
        Ok(Some(event))
    }
}

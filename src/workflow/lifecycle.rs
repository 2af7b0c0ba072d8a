//! Request-path ticket operations.
//!
//! Each operation locks the ticket, mutates a copy, and persists the copy
//! together with its timeline event in one call. Either everything lands
//! or nothing does. Automation triggers are queued after the write and
//! never awaited.

use std::sync::Arc;

use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::{debug, info};

use super::locks::TicketLocks;
use crate::automation::AutomationQueue;
use crate::error::{Error, Result};
use crate::event::{EventKind, TicketEvent, Visibility};
use crate::model::*;
use crate::sla::clock::{SlaClock, resolve_default_plan};
use crate::store::TicketStore;
use crate::telemetry::metrics;

/// The transition guard: the only way tickets change status.
pub struct Lifecycle {
    store: Arc<dyn TicketStore>,
    clock: SlaClock,
    locks: TicketLocks,
    automation: Option<AutomationQueue>,
}

impl Lifecycle {
    pub fn new(store: Arc<dyn TicketStore>, clock: SlaClock, locks: TicketLocks) -> Self {
        Self {
            store,
            clock,
            locks,
            automation: None,
        }
    }

    /// Raise automation triggers on this queue after each successful write.
    pub fn with_automation(mut self, queue: AutomationQueue) -> Self {
        self.automation = Some(queue);
        self
    }

    /// Load a ticket or fail with `NotFound`.
    pub async fn get(&self, id: TicketId) -> Result<Ticket> {
        self.store
            .get_ticket(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("ticket {id}")))
    }

    /// Create a ticket, binding an SLA plan and due date.
    ///
    /// An explicit plan must exist in the ticket's tenant; otherwise the priority-derived default is
    /// used, and with no active plan at all `due_at` stays unset.
    pub async fn create_ticket(&self, new: NewTicket) -> Result<Ticket> {
        let now = Utc::now();
        let mut ticket = Ticket {
            id: TicketId::new(),
            tenant_id: new.tenant_id,
            subject: new.subject,
            status: Status::New,
            priority: new.priority,
            assignee: None,
            department: new.department,
            category: new.category,
            sla_plan: None,
            sla_plan_explicit: false,
            tags: new.tags,
            source: new.source,
            due_at: None,
            closed_at: None,
            created_at: now,
            updated_at: now,
            last_event_at: now,
            version: 0,
        };

        match new.sla_plan {
            Some(plan_id) => {
                let plan = self
                    .store
                    .get_plan(plan_id)
                    .await?
                    .filter(|p| p.tenant_id == ticket.tenant_id)
                    .ok_or_else(|| Error::NotFound(format!("sla plan {plan_id}")))?;
                self.clock.apply_plan(&mut ticket, Some(&plan), true);
            }
            None => {
                let priority = ticket.priority;
                let plans = self.store.active_plans(ticket.tenant_id).await?;
                self.clock
                    .apply_plan(&mut ticket, resolve_default_plan(&plans, priority), false);
            }
        }

        let event = TicketEvent::new(
            &ticket,
            new.actor,
            Visibility::Internal,
            EventKind::Created {
                priority: ticket.priority,
                sla_plan: ticket.sla_plan,
                due_at: ticket.due_at,
            },
            now,
        );
        let saved = self.store.persist(&ticket, &[event]).await?;

        info!(
            ticket = %saved.id,
            tenant = %saved.tenant_id,
            priority = %saved.priority,
            due_at = ?saved.due_at,
            "ticket created"
        );

        self.raise(saved.id, Trigger::TicketCreated);
        if saved.source == TicketSource::Email {
            self.raise(saved.id, Trigger::InboundEmail);
        }
        Ok(saved)
    }

    /// Move a ticket along an allowed edge.
    pub async fn transition(
        &self,
        id: TicketId,
        target: Status,
        actor: Option<UserId>,
        note: Option<String>,
    ) -> Result<TicketEvent> {
        let _guard = self.locks.lock(id).await;
        let mut ticket = self.get(id).await?;
        let now = Utc::now();

        let from = ticket.apply_transition(target, now)?;
        let event = TicketEvent::new(
            &ticket,
            actor,
            Visibility::Public,
            EventKind::StatusChange {
                from,
                to: target,
                note,
            },
            now,
        );
        self.store
            .persist(&ticket, std::slice::from_ref(&event))
            .await?;

        metrics::ticket_transitions().add(
            1,
            &[
                KeyValue::new("from", from.to_string()),
                KeyValue::new("to", target.to_string()),
            ],
        );
        info!(ticket = %id, %from, to = %target, "status changed");

        self.raise(id, Trigger::StatusChanged);
        Ok(event)
    }

    /// Assign a ticket. A `New` ticket becomes `Assigned` on the way.
    pub async fn assign(
        &self,
        id: TicketId,
        assignee: UserId,
        actor: Option<UserId>,
    ) -> Result<TicketEvent> {
        let _guard = self.locks.lock(id).await;
        let mut ticket = self.get(id).await?;
        let now = Utc::now();

        let change = ticket.apply_assignment(assignee, now);
        let event = TicketEvent::new(
            &ticket,
            actor,
            Visibility::Internal,
            EventKind::Assignment {
                from: change.from,
                to: change.to,
                status_change: change.status_change,
            },
            now,
        );
        self.store
            .persist(&ticket, std::slice::from_ref(&event))
            .await?;

        if let Some((from, to)) = change.status_change {
            metrics::ticket_transitions().add(
                1,
                &[
                    KeyValue::new("from", from.to_string()),
                    KeyValue::new("to", to.to_string()),
                ],
            );
        }
        info!(ticket = %id, assignee = %assignee, "ticket assigned");

        self.raise(id, Trigger::TicketUpdated);
        Ok(event)
    }

    /// Append a comment. Status is untouched.
    pub async fn add_comment(
        &self,
        id: TicketId,
        text: impl Into<String>,
        internal: bool,
        actor: Option<UserId>,
    ) -> Result<TicketEvent> {
        let _guard = self.locks.lock(id).await;
        let mut ticket = self.get(id).await?;
        let now = Utc::now();

        ticket.last_event_at = now;
        let body = text.into();
        let (visibility, kind) = if internal {
            (Visibility::Internal, EventKind::CommentInternal { body })
        } else {
            (Visibility::Public, EventKind::CommentPublic { body })
        };
        let event = TicketEvent::new(&ticket, actor, visibility, kind, now);
        self.store
            .persist(&ticket, std::slice::from_ref(&event))
            .await?;

        debug!(ticket = %id, internal, "comment added");

        self.raise(id, Trigger::CommentAdded);
        Ok(event)
    }

    /// Change priority. Tickets on a priority-derived plan get their plan
    /// and due date re-resolved; explicit plans keep their due date.
    pub async fn change_priority(
        &self,
        id: TicketId,
        priority: Priority,
        actor: Option<UserId>,
    ) -> Result<TicketEvent> {
        let _guard = self.locks.lock(id).await;
        let mut ticket = self.get(id).await?;
        let now = Utc::now();

        let from = ticket.priority;
        ticket.priority = priority;
        ticket.updated_at = now;
        ticket.last_event_at = now;
        self.clock
            .rederive_default_plan(self.store.as_ref(), &mut ticket)
            .await?;

        let event = TicketEvent::new(
            &ticket,
            actor,
            Visibility::Internal,
            EventKind::PriorityChange {
                from,
                to: priority,
                due_at: ticket.due_at,
            },
            now,
        );
        self.store
            .persist(&ticket, std::slice::from_ref(&event))
            .await?;

        info!(ticket = %id, %from, to = %priority, due_at = ?ticket.due_at, "priority changed");

        self.raise(id, Trigger::TicketUpdated);
        Ok(event)
    }

    fn raise(&self, id: TicketId, trigger: Trigger) {
        if let Some(queue) = &self.automation {
            queue.enqueue(id, trigger);
        }
    }
}

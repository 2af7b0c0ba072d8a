//! Shared fixtures: an in-memory store, a recording dispatcher, and builders
//! for tickets and plans.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use ticketflow::automation::AutomationEngine;
use ticketflow::dispatch::{Dispatcher, EscalationNotice, TicketSummary};
use ticketflow::model::*;
use ticketflow::sla::{EscalationExecutor, MonitorConfig, SlaClock, SlaMonitor};
use ticketflow::store::memory::MemoryStore;
use ticketflow::workflow::{Lifecycle, TicketLocks};

/// Keeps every dispatch instead of sending it.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub notices: Mutex<Vec<EscalationNotice>>,
    pub posts: Mutex<Vec<(String, TicketSummary)>>,
}

impl Dispatcher for RecordingDispatcher {
    fn notify_stakeholders(&self, notice: EscalationNotice) {
        self.notices.lock().push(notice);
    }

    fn post_ticket_summary(&self, url: &str, summary: TicketSummary) {
        self.posts.lock().push((url.to_string(), summary));
    }
}

pub struct Harness {
    pub tenant: TenantId,
    pub store: Arc<MemoryStore>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub locks: TicketLocks,
    pub clock: SlaClock,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            tenant: TenantId::new(),
            store: Arc::new(MemoryStore::new()),
            dispatcher: Arc::new(RecordingDispatcher::default()),
            locks: TicketLocks::new(),
            clock: SlaClock::default(),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(self.store.clone(), self.clock, self.locks.clone())
    }

    pub fn executor(&self) -> EscalationExecutor {
        EscalationExecutor::new(
            self.store.clone(),
            self.store.clone(),
            self.dispatcher.clone(),
            self.locks.clone(),
        )
    }

    pub fn engine(&self) -> AutomationEngine {
        AutomationEngine::new(
            self.store.clone(),
            self.store.clone(),
            self.dispatcher.clone(),
            self.clock,
            self.locks.clone(),
        )
    }

    pub fn monitor(&self) -> SlaMonitor {
        SlaMonitor::new(
            self.store.clone(),
            Arc::new(self.executor()),
            MonitorConfig::default(),
        )
    }

    /// Seed a stored ticket (version 1, no timeline).
    pub fn seed(&self, status: Status, priority: Priority) -> Ticket {
        let ticket = ticket(self.tenant, status, priority);
        self.store.insert_ticket(ticket.clone());
        ticket
    }

    /// Seed a stored ticket due at `due_at` on `plan`.
    pub fn seed_due(&self, status: Status, due_at: DateTime<Utc>, plan: Option<PlanId>) -> Ticket {
        let mut ticket = ticket(self.tenant, status, Priority::Normal);
        ticket.due_at = Some(due_at);
        ticket.sla_plan = plan;
        ticket.sla_plan_explicit = plan.is_some();
        self.store.insert_ticket(ticket.clone());
        ticket
    }

    pub fn plan(&self, name: &str, minutes: i64, calendar: CalendarMode) -> SlaPlan {
        let plan = plan(self.tenant, name, minutes, calendar);
        self.store.insert_plan(plan.clone());
        plan
    }

    pub fn plan_with_policy(&self, policy: Option<Parsed<EscalationPolicy>>) -> SlaPlan {
        let mut plan = plan(self.tenant, "Standard", 480, CalendarMode::TwentyFourSeven);
        plan.escalation_policy = policy;
        self.store.insert_plan(plan.clone());
        plan
    }

    pub async fn ticket(&self, id: TicketId) -> Ticket {
        use ticketflow::store::TicketStore;
        self.store.get_ticket(id).await.unwrap().expect("ticket exists")
    }
}

pub fn ticket(tenant: TenantId, status: Status, priority: Priority) -> Ticket {
    let created = Utc::now() - Duration::hours(2);
    Ticket {
        id: TicketId::new(),
        tenant_id: tenant,
        subject: "Printer on fire".to_string(),
        status,
        priority,
        assignee: None,
        department: None,
        category: None,
        sla_plan: None,
        sla_plan_explicit: false,
        tags: BTreeSet::new(),
        source: TicketSource::Portal,
        due_at: None,
        closed_at: (status == Status::Closed).then_some(created),
        created_at: created,
        updated_at: created,
        last_event_at: created,
        version: 1,
    }
}

pub fn plan(tenant: TenantId, name: &str, minutes: i64, calendar: CalendarMode) -> SlaPlan {
    SlaPlan {
        id: PlanId::new(),
        tenant_id: tenant,
        name: name.to_string(),
        response_time_minutes: minutes,
        resolution_time_minutes: 0,
        calendar,
        escalation_policy: None,
        active: true,
    }
}

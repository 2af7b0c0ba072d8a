//! Tickets: status, priority and the record the lifecycle operates on.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::*;
use crate::error::Error;

// ---------------------------------------------------------------------------
// Ticket
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub tenant_id: TenantId,
    pub subject: String,

    /// Only ever changed through the transition guard.
    pub status: Status,
    pub priority: Priority,

    pub assignee: Option<UserId>,
    pub department: Option<DepartmentId>,
    pub category: Option<CategoryId>,

    /// Plan the due date was computed from.
    pub sla_plan: Option<PlanId>,
    /// `true` when the plan was chosen explicitly. A priority-derived plan
    /// (`false`) is re-resolved whenever the priority changes.
    pub sla_plan_explicit: bool,

    pub tags: BTreeSet<String>,
    pub source: TicketSource,

    pub due_at: Option<DateTime<Utc>>,
    /// Set iff `status == Closed`.
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_event_at: DateTime<Utc>,

    /// Optimistic-concurrency counter, incremented by every save.
    pub version: i64,
}

impl Ticket {
    pub fn is_assigned(&self) -> bool {
        self.assignee.is_some()
    }
}

/// How the ticket entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketSource {
    Portal,
    Api,
    Email,
}

impl std::fmt::Display for TicketSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TicketSource::Portal => "portal",
            TicketSource::Api => "api",
            TicketSource::Email => "email",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TicketSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "portal" => Ok(TicketSource::Portal),
            "api" => Ok(TicketSource::Api),
            "email" => Ok(TicketSource::Email),
            other => Err(Error::Other(format!("unknown ticket source: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status. Allowed edges live in [`crate::workflow::transitions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    New,
    Assigned,
    InProgress,
    WaitingForInfo,
    Completed,
    Closed,
    Rejected,
    Duplicate,
    Merged,
}

impl Status {
    pub const ALL: [Status; 9] = [
        Status::New,
        Status::Assigned,
        Status::InProgress,
        Status::WaitingForInfo,
        Status::Completed,
        Status::Closed,
        Status::Rejected,
        Status::Duplicate,
        Status::Merged,
    ];

    /// The SLA clock stops once work is completed or closed.
    pub fn is_resolved(self) -> bool {
        matches!(self, Status::Completed | Status::Closed)
    }

    /// Dead-end states with no outgoing edges.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Rejected | Status::Duplicate | Status::Merged)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::New => "new",
            Status::Assigned => "assigned",
            Status::InProgress => "in_progress",
            Status::WaitingForInfo => "waiting_for_info",
            Status::Completed => "completed",
            Status::Closed => "closed",
            Status::Rejected => "rejected",
            Status::Duplicate => "duplicate",
            Status::Merged => "merged",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.to_string() == s)
            .ok_or_else(|| Error::Other(format!("unknown status: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Urgent,
        Priority::Critical,
    ];

    /// Next step up the escalation ladder. `None` at the top.
    pub fn escalated(self) -> Option<Priority> {
        match self {
            Priority::Low => Some(Priority::Normal),
            Priority::Normal => Some(Priority::High),
            Priority::High => Some(Priority::Urgent),
            Priority::Urgent => Some(Priority::Critical),
            Priority::Critical => None,
        }
    }

    /// Keyword a default SLA plan's name must contain to serve this priority.
    pub fn plan_keyword(self) -> &'static str {
        match self {
            Priority::Critical => "Critical",
            Priority::Urgent => "Urgent",
            Priority::High => "High Priority",
            Priority::Normal | Priority::Low => "Standard",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
            Priority::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.to_string() == s)
            .ok_or_else(|| Error::Other(format!("unknown priority: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a new ticket. Consumed by `Lifecycle::create_ticket`.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub(crate) tenant_id: TenantId,
    pub(crate) subject: String,
    pub(crate) priority: Priority,
    pub(crate) department: Option<DepartmentId>,
    pub(crate) category: Option<CategoryId>,
    pub(crate) sla_plan: Option<PlanId>,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) source: TicketSource,
    pub(crate) actor: Option<UserId>,
}

impl NewTicket {
    pub fn new(tenant_id: TenantId, subject: impl Into<String>) -> Self {
        Self {
            tenant_id,
            subject: subject.into(),
            priority: Priority::Normal,
            department: None,
            category: None,
            sla_plan: None,
            tags: BTreeSet::new(),
            source: TicketSource::Portal,
            actor: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn department(mut self, department: DepartmentId) -> Self {
        self.department = Some(department);
        self
    }

    pub fn category(mut self, category: CategoryId) -> Self {
        self.category = Some(category);
        self
    }

    /// Pin an explicit SLA plan instead of deriving one from the priority.
    pub fn sla_plan(mut self, plan: PlanId) -> Self {
        self.sla_plan = Some(plan);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn source(mut self, source: TicketSource) -> Self {
        self.source = source;
        self
    }

    pub fn actor(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }
}

//! Ticket timeline events.
//!
//! Every mutating operation appends one or more events. Events are
//! immutable once written and form the ticket's only audit timeline;
//! consumers read them to render history or drive notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    EscalationPolicy, EventId, PlanId, Priority, RuleId, Status, TenantId, Ticket, TicketId,
    UserId,
};

/// A single entry on a ticket's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketEvent {
    pub id: EventId,
    pub ticket_id: TicketId,
    pub tenant_id: TenantId,
    /// `None` means the system acted.
    pub actor: Option<UserId>,
    pub visibility: Visibility,
    pub kind: EventKind,
    pub created_at: DateTime<Utc>,
}

impl TicketEvent {
    pub fn new(
        ticket: &Ticket,
        actor: Option<UserId>,
        visibility: Visibility,
        kind: EventKind,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            ticket_id: ticket.id,
            tenant_id: ticket.tenant_id,
            actor,
            visibility,
            kind,
            created_at: at,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Internal,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Internal => write!(f, "internal"),
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "internal" => Ok(Visibility::Internal),
            other => Err(crate::error::Error::Other(format!(
                "unknown visibility: {other}"
            ))),
        }
    }
}

/// What happened, with the structured payload for that event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Created {
        priority: Priority,
        sla_plan: Option<PlanId>,
        due_at: Option<DateTime<Utc>>,
    },
    StatusChange {
        from: Status,
        to: Status,
        note: Option<String>,
    },
    Assignment {
        from: Option<UserId>,
        to: UserId,
        /// Set when assigning a `New` ticket moved it to `Assigned`.
        status_change: Option<(Status, Status)>,
    },
    PriorityChange {
        from: Priority,
        to: Priority,
        due_at: Option<DateTime<Utc>>,
    },
    CommentPublic {
        body: String,
    },
    CommentInternal {
        body: String,
    },
    Escalation {
        actions: Vec<String>,
        reason: String,
        priority: Priority,
        assignee: Option<UserId>,
        policy: EscalationPolicy,
    },
    Automation {
        rule_id: RuleId,
        rule_name: String,
        actions: Vec<String>,
    },
}

/// Flat event type, stored alongside the payload for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    StatusChange,
    Assignment,
    PriorityChange,
    CommentPublic,
    CommentInternal,
    Escalation,
    Automation,
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::Created { .. } => EventType::Created,
            EventKind::StatusChange { .. } => EventType::StatusChange,
            EventKind::Assignment { .. } => EventType::Assignment,
            EventKind::PriorityChange { .. } => EventType::PriorityChange,
            EventKind::CommentPublic { .. } => EventType::CommentPublic,
            EventKind::CommentInternal { .. } => EventType::CommentInternal,
            EventKind::Escalation { .. } => EventType::Escalation,
            EventKind::Automation { .. } => EventType::Automation,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventType::Created => "created",
            EventType::StatusChange => "status_change",
            EventType::Assignment => "assignment",
            EventType::PriorityChange => "priority_change",
            EventType::CommentPublic => "comment_public",
            EventType::CommentInternal => "comment_internal",
            EventType::Escalation => "escalation",
            EventType::Automation => "automation",
        };
        write!(f, "{s}")
    }
}

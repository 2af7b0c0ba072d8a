//! Automation rules: trigger, condition, ordered actions.
//!
//! Conditions and actions arrive as JSON from the rule editor. They are
//! parsed once, when the rule is built, into typed values; a malformed
//! condition is kept as [`Parsed::Malformed`] so the engine can skip the
//! rule without re-parsing on every trigger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Parsed;
use super::ids::*;
use super::ticket::{Priority, Status, Ticket};
use crate::error::Error;

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// Lifecycle event that causes a tenant's rules to be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    TicketCreated,
    TicketUpdated,
    StatusChanged,
    CommentAdded,
    SlaWarning,
    ScheduleCron,
    InboundEmail,
    CustomWebhook,
}

impl Trigger {
    pub const ALL: [Trigger; 8] = [
        Trigger::TicketCreated,
        Trigger::TicketUpdated,
        Trigger::StatusChanged,
        Trigger::CommentAdded,
        Trigger::SlaWarning,
        Trigger::ScheduleCron,
        Trigger::InboundEmail,
        Trigger::CustomWebhook,
    ];
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Trigger::TicketCreated => "ticket_created",
            Trigger::TicketUpdated => "ticket_updated",
            Trigger::StatusChanged => "status_changed",
            Trigger::CommentAdded => "comment_added",
            Trigger::SlaWarning => "sla_warning",
            Trigger::ScheduleCron => "schedule_cron",
            Trigger::InboundEmail => "inbound_email",
            Trigger::CustomWebhook => "custom_webhook",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Trigger {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Trigger::ALL
            .into_iter()
            .find(|t| t.to_string() == s)
            .ok_or_else(|| Error::Other(format!("unknown trigger: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// Predicate over a ticket. Every field is optional; an absent field
/// matches anything, present fields are ANDed. Unknown keys are rejected
/// so a misspelled field cannot widen the match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleCondition {
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub department: Option<DepartmentId>,
    #[serde(default)]
    pub category: Option<CategoryId>,
    /// Matches when the ticket carries at least one of these tags.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub is_assigned: Option<bool>,
}

impl RuleCondition {
    /// Parse an editor condition. Only a JSON object is accepted; serde
    /// would otherwise read `[]` as a sequence of absent fields.
    pub fn parse(raw: serde_json::Value) -> Parsed<RuleCondition> {
        if !raw.is_object() {
            return Parsed::Malformed {
                error: format!("condition must be a JSON object, got {raw}"),
                raw,
            };
        }
        Parsed::from_value(raw)
    }

    pub fn matches(&self, ticket: &Ticket) -> bool {
        if self.status.is_some_and(|s| s != ticket.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != ticket.priority) {
            return false;
        }
        if self.department.is_some() && self.department != ticket.department {
            return false;
        }
        if self.category.is_some() && self.category != ticket.category {
            return false;
        }
        if let Some(tags) = &self.tags {
            if !tags.is_empty() && !tags.iter().any(|t| ticket.tags.contains(t)) {
                return false;
            }
        }
        if self.is_assigned.is_some_and(|a| a != ticket.is_assigned()) {
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// One step of a rule, executed in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    SetStatus { status: Status },
    SetPriority { priority: Priority },
    AssignTo { user_id: UserId },
    AddTag { tag: String },
    RemoveTag { tag: String },
    /// Internal comment authored by the system.
    AddComment { text: String },
    /// Fire-and-forget POST of the ticket summary.
    Webhook { url: String },
    SetSla { plan_id: PlanId },
    /// Unknown `type` or bad fields. Logged and skipped at run time.
    #[serde(skip)]
    Unrecognized { kind: String, error: String },
}

impl Action {
    pub fn from_value(raw: &serde_json::Value) -> Self {
        match serde_json::from_value::<Action>(raw.clone()) {
            Ok(action) => action,
            Err(e) => Action::Unrecognized {
                kind: raw
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("<missing>")
                    .to_string(),
                error: e.to_string(),
            },
        }
    }

    /// Parse a stored action list. Anything but a JSON array yields a single
    /// unrecognized entry so the failure still shows up in the logs.
    pub fn list_from_value(raw: &serde_json::Value) -> Vec<Action> {
        match raw.as_array() {
            Some(items) => items.iter().map(Action::from_value).collect(),
            None => vec![Action::Unrecognized {
                kind: "<action list>".to_string(),
                error: format!("expected a JSON array, got {raw}"),
            }],
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Action::Unrecognized { .. })
    }

    pub fn kind(&self) -> &str {
        match self {
            Action::SetStatus { .. } => "set_status",
            Action::SetPriority { .. } => "set_priority",
            Action::AssignTo { .. } => "assign_to",
            Action::AddTag { .. } => "add_tag",
            Action::RemoveTag { .. } => "remove_tag",
            Action::AddComment { .. } => "add_comment",
            Action::Webhook { .. } => "webhook",
            Action::SetSla { .. } => "set_sla",
            Action::Unrecognized { kind, .. } => kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct AutomationRule {
    pub id: RuleId,
    pub tenant_id: TenantId,
    pub name: String,
    pub trigger: Trigger,
    /// `None` matches every ticket.
    pub condition: Option<Parsed<RuleCondition>>,
    pub actions: Vec<Action>,
    /// Lower runs first.
    pub priority: i32,
    pub enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl AutomationRule {
    /// Reject a rule whose condition or actions did not parse. Stores call
    /// this before writing so only well-formed rules are saved.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(Parsed::Malformed { error, .. }) = &self.condition {
            return Err(Error::MalformedCondition(error.clone()));
        }
        match self.actions.iter().find(|a| !a.is_recognized()) {
            Some(Action::Unrecognized { kind, error }) => {
                Err(Error::MalformedAction(format!("{kind}: {error}")))
            }
            _ => Ok(()),
        }
    }

    /// Build an enabled rule from the editor's JSON, parsing it once.
    pub fn from_json(
        tenant_id: TenantId,
        name: impl Into<String>,
        trigger: Trigger,
        condition: Option<serde_json::Value>,
        actions: &serde_json::Value,
        priority: i32,
    ) -> Self {
        Self {
            id: RuleId::new(),
            tenant_id,
            name: name.into(),
            trigger,
            condition: condition.map(RuleCondition::parse),
            actions: Action::list_from_value(actions),
            priority,
            enabled: true,
            last_run_at: None,
        }
    }
}

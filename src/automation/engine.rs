//! Rule evaluation for one `(ticket, trigger)` event.
//!
//! Every enabled rule of the ticket's tenant for the trigger runs, lowest
//! priority first, with no short-circuit. Each rule is isolated: it sees
//! the ticket as left by the rules before it, persists its own changes in
//! one write, and a failure in it is logged without touching later rules.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::dispatch::{Dispatcher, TicketSummary};
use crate::error::{Error, Result};
use crate::event::{EventKind, TicketEvent, Visibility};
use crate::model::*;
use crate::sla::clock::SlaClock;
use crate::store::{AuditRecord, AuditSink, TicketStore, audit_best_effort};
use crate::telemetry::metrics;
use crate::workflow::TicketLocks;

/// Per-event tally of what happened to each rule.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    /// Condition matched and the actions were persisted.
    pub applied: usize,
    pub not_matched: usize,
    /// Malformed condition; rule ignored.
    pub skipped: usize,
    pub failed: usize,
}

enum RuleOutcome {
    Applied,
    NotMatched,
    Skipped,
    TicketGone,
}

/// Mutations accumulated while one rule's actions run.
#[derive(Default)]
struct RuleRun {
    events: Vec<TicketEvent>,
    applied: Vec<String>,
    /// Webhook targets, posted only once the rule's write has landed.
    webhooks: Vec<String>,
}

pub struct AutomationEngine {
    store: Arc<dyn TicketStore>,
    audit: Arc<dyn AuditSink>,
    dispatcher: Arc<dyn Dispatcher>,
    clock: SlaClock,
    locks: TicketLocks,
}

impl AutomationEngine {
    pub fn new(
        store: Arc<dyn TicketStore>,
        audit: Arc<dyn AuditSink>,
        dispatcher: Arc<dyn Dispatcher>,
        clock: SlaClock,
        locks: TicketLocks,
    ) -> Self {
        Self {
            store,
            audit,
            dispatcher,
            clock,
            locks,
        }
    }

    /// Evaluate and apply the tenant's rules for `trigger` on a ticket.
    ///
    /// A missing ticket is a silent no-op. Errors loading the rule set are
    /// returned; errors inside a rule are logged and counted.
    pub async fn process_event(&self, id: TicketId, trigger: Trigger) -> Result<ProcessReport> {
        let mut report = ProcessReport::default();

        let Some(ticket) = self.store.get_ticket(id).await? else {
            debug!(ticket = %id, %trigger, "ticket gone, nothing to automate");
            return Ok(report);
        };

        let rules = self.store.enabled_rules(ticket.tenant_id, trigger).await?;
        debug!(ticket = %id, %trigger, rules = rules.len(), "evaluating automation rules");

        for rule in &rules {
            let result = match self.run_rule(id, rule).await {
                Ok(RuleOutcome::Applied) => {
                    report.applied += 1;
                    "applied"
                }
                Ok(RuleOutcome::NotMatched) => {
                    report.not_matched += 1;
                    "not_matched"
                }
                Ok(RuleOutcome::Skipped) => {
                    report.skipped += 1;
                    "skipped"
                }
                Ok(RuleOutcome::TicketGone) => {
                    debug!(ticket = %id, "ticket deleted mid-evaluation");
                    break;
                }
                Err(e) => {
                    error!(ticket = %id, rule = %rule.id, name = %rule.name, "automation rule failed: {e}");
                    report.failed += 1;
                    "failed"
                }
            };
            metrics::automation_rule_runs().add(
                1,
                &[
                    KeyValue::new("trigger", trigger.to_string()),
                    KeyValue::new("result", result),
                ],
            );
        }

        Ok(report)
    }

    async fn run_rule(&self, id: TicketId, rule: &AutomationRule) -> Result<RuleOutcome> {
        let condition = match &rule.condition {
            None => None,
            Some(Parsed::Valid(condition)) => Some(condition),
            Some(Parsed::Malformed { error, .. }) => {
                let err = Error::MalformedCondition(error.clone());
                warn!(rule = %rule.id, name = %rule.name, "{err}, rule skipped");
                return Ok(RuleOutcome::Skipped);
            }
        };

        let _guard = self.locks.lock(id).await;
        let Some(mut ticket) = self.store.get_ticket(id).await? else {
            return Ok(RuleOutcome::TicketGone);
        };

        if condition.is_some_and(|c| !c.matches(&ticket)) {
            return Ok(RuleOutcome::NotMatched);
        }

        let before = snapshot(&ticket);
        let now = Utc::now();
        let mut run = RuleRun::default();

        for action in &rule.actions {
            self.apply_action(&mut ticket, rule, action, now, &mut run)
                .await?;
        }

        ticket.updated_at = now;
        ticket.last_event_at = now;
        run.events.push(TicketEvent::new(
            &ticket,
            None,
            Visibility::Internal,
            EventKind::Automation {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                actions: run.applied.clone(),
            },
            now,
        ));

        let saved = self.store.persist(&ticket, &run.events).await?;
        for url in &run.webhooks {
            self.dispatcher
                .post_ticket_summary(url, TicketSummary::from(&saved));
        }
        self.store.touch_rule(rule.id, now).await?;

        let mut after = snapshot(&saved);
        after["rule_id"] = json!(rule.id);
        after["rule_name"] = json!(rule.name);
        after["actions"] = json!(run.applied);
        audit_best_effort(
            self.audit.as_ref(),
            AuditRecord::system(&saved, "automation_rule", before, after),
        )
        .await;

        info!(
            ticket = %id,
            rule = %rule.id,
            name = %rule.name,
            actions = ?run.applied,
            "automation rule applied"
        );
        Ok(RuleOutcome::Applied)
    }

    /// Apply one action to the in-flight ticket. Actions that cannot apply
    /// (bad edge, unknown plan, unknown type) are logged and skipped; only
    /// store failures abort the rule.
    async fn apply_action(
        &self,
        ticket: &mut Ticket,
        rule: &AutomationRule,
        action: &Action,
        now: DateTime<Utc>,
        run: &mut RuleRun,
    ) -> Result<()> {
        match action {
            Action::SetStatus { status } => match ticket.apply_transition(*status, now) {
                Ok(from) => {
                    run.events.push(TicketEvent::new(
                        ticket,
                        None,
                        Visibility::Public,
                        EventKind::StatusChange {
                            from,
                            to: *status,
                            note: Some(format!("automation rule: {}", rule.name)),
                        },
                        now,
                    ));
                    metrics::ticket_transitions().add(
                        1,
                        &[
                            KeyValue::new("from", from.to_string()),
                            KeyValue::new("to", status.to_string()),
                        ],
                    );
                }
                Err(e) => {
                    warn!(ticket = %ticket.id, rule = %rule.id, "set_status skipped: {e}");
                    return Ok(());
                }
            },
            Action::SetPriority { priority } => {
                let from = ticket.priority;
                ticket.priority = *priority;
                self.clock
                    .rederive_default_plan(self.store.as_ref(), ticket)
                    .await?;
                run.events.push(TicketEvent::new(
                    ticket,
                    None,
                    Visibility::Internal,
                    EventKind::PriorityChange {
                        from,
                        to: *priority,
                        due_at: ticket.due_at,
                    },
                    now,
                ));
            }
            Action::AssignTo { user_id } => {
                let change = ticket.apply_assignment(*user_id, now);
                run.events.push(TicketEvent::new(
                    ticket,
                    None,
                    Visibility::Internal,
                    EventKind::Assignment {
                        from: change.from,
                        to: change.to,
                        status_change: change.status_change,
                    },
                    now,
                ));
            }
            Action::AddTag { tag } => {
                ticket.tags.insert(tag.clone());
            }
            Action::RemoveTag { tag } => {
                ticket.tags.remove(tag);
            }
            Action::AddComment { text } => {
                run.events.push(TicketEvent::new(
                    ticket,
                    None,
                    Visibility::Internal,
                    EventKind::CommentInternal { body: text.clone() },
                    now,
                ));
            }
            Action::Webhook { url } => {
                run.webhooks.push(url.clone());
            }
            Action::SetSla { plan_id } => {
                let plan = self
                    .store
                    .get_plan(*plan_id)
                    .await?
                    .filter(|p| p.tenant_id == ticket.tenant_id);
                let Some(plan) = plan else {
                    warn!(ticket = %ticket.id, rule = %rule.id, plan = %plan_id, "set_sla skipped: plan not found");
                    return Ok(());
                };
                self.clock.apply_plan(ticket, Some(&plan), true);
            }
            Action::Unrecognized { kind, error } => {
                warn!(rule = %rule.id, name = %rule.name, kind = %kind, "unrecognized action skipped: {error}");
                return Ok(());
            }
        }

        run.applied.push(action.kind().to_string());
        Ok(())
    }
}

fn snapshot(ticket: &Ticket) -> serde_json::Value {
    json!({
        "status": ticket.status,
        "priority": ticket.priority,
        "assignee": ticket.assignee,
        "tags": ticket.tags,
        "sla_plan": ticket.sla_plan,
        "due_at": ticket.due_at,
    })
}

//! Outbound notifications and webhooks.
//!
//! Fire-and-forget: every dispatch runs on its own task with a bounded
//! timeout and only its outcome is logged. Nothing is retried.

use std::time::Duration;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::{Priority, Status, TenantId, Ticket, TicketId, UserId};
use crate::telemetry::metrics;

/// JSON body POSTed to webhooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketSummary {
    pub id: TicketId,
    pub tenant_id: TenantId,
    pub subject: String,
    pub status: Status,
    pub priority: Priority,
    pub assignee: Option<UserId>,
    pub tags: Vec<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Ticket> for TicketSummary {
    fn from(ticket: &Ticket) -> Self {
        Self {
            id: ticket.id,
            tenant_id: ticket.tenant_id,
            subject: ticket.subject.clone(),
            status: ticket.status,
            priority: ticket.priority,
            assignee: ticket.assignee,
            tags: ticket.tags.iter().cloned().collect(),
            due_at: ticket.due_at,
            updated_at: ticket.updated_at,
        }
    }
}

/// Stakeholder notification raised by an SLA escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationNotice {
    pub ticket: TicketSummary,
    pub reason: String,
    pub targets: Vec<String>,
    /// Policy webhook, when one is configured.
    pub webhook: Option<String>,
}

/// Notification/webhook collaborator. Implementations must not block the
/// caller on delivery.
pub trait Dispatcher: Send + Sync {
    fn notify_stakeholders(&self, notice: EscalationNotice);

    fn post_ticket_summary(&self, url: &str, summary: TicketSummary);
}

/// Delivers over HTTP with reqwest.
#[derive(Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
}

impl HttpDispatcher {
    /// `timeout` bounds each request end to end.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Dispatch(format!("failed to build http client: {e}")))?;
        Ok(Self { client })
    }

    fn spawn_post<T>(&self, kind: &'static str, url: String, body: T)
    where
        T: Serialize + Send + 'static,
    {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(kind, url = %url, "no async runtime, dispatch dropped");
            return;
        };
        let client = self.client.clone();
        handle.spawn(async move {
            let result = match client.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(kind, url = %url, status = resp.status().as_u16(), "dispatch delivered");
                    "ok"
                }
                Ok(resp) => {
                    warn!(kind, url = %url, status = resp.status().as_u16(), "dispatch rejected");
                    "rejected"
                }
                Err(e) => {
                    warn!(kind, url = %url, "dispatch failed: {e}");
                    "error"
                }
            };
            metrics::dispatches().add(
                1,
                &[KeyValue::new("kind", kind), KeyValue::new("result", result)],
            );
        });
    }
}

impl Dispatcher for HttpDispatcher {
    fn notify_stakeholders(&self, notice: EscalationNotice) {
        info!(
            ticket = %notice.ticket.id,
            targets = ?notice.targets,
            reason = %notice.reason,
            "notifying stakeholders"
        );
        if let Some(url) = notice.webhook.clone() {
            self.spawn_post("escalation", url, notice);
        }
    }

    fn post_ticket_summary(&self, url: &str, summary: TicketSummary) {
        self.spawn_post("webhook", url.to_string(), summary);
    }
}

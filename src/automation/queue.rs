//! Trigger queue between the operations that raise triggers and the
//! engine that evaluates them.
//!
//! Callers enqueue and move on; a single consumer task drains the channel
//! in arrival order, so automation effects are eventually consistent with
//! the request that raised them.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use super::engine::AutomationEngine;
use crate::model::{TicketId, Trigger};
use crate::telemetry::ticket::start_automation_span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutomationJob {
    pub ticket_id: TicketId,
    pub trigger: Trigger,
}

/// Cloneable handle for raising triggers. Never blocks.
#[derive(Debug, Clone)]
pub struct AutomationQueue {
    tx: mpsc::UnboundedSender<AutomationJob>,
}

impl AutomationQueue {
    pub fn enqueue(&self, ticket_id: TicketId, trigger: Trigger) {
        let job = AutomationJob { ticket_id, trigger };
        if self.tx.send(job).is_err() {
            warn!(ticket = %ticket_id, %trigger, "automation worker stopped, trigger dropped");
        }
    }
}

/// Start the consumer task. It exits once every queue handle is dropped.
pub fn spawn_worker(engine: Arc<AutomationEngine>) -> (AutomationQueue, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<AutomationJob>();

    let handle = tokio::spawn(async move {
        info!("automation worker started");
        while let Some(job) = rx.recv().await {
            let span = start_automation_span(&job.ticket_id, job.trigger);
            match engine
                .process_event(job.ticket_id, job.trigger)
                .instrument(span)
                .await
            {
                Ok(report) => debug!(ticket = %job.ticket_id, trigger = %job.trigger, ?report, "automation processed"),
                Err(e) => error!(ticket = %job.ticket_id, trigger = %job.trigger, "automation failed: {e}"),
            }
        }
        info!("automation worker stopped");
    });

    (AutomationQueue { tx }, handle)
}

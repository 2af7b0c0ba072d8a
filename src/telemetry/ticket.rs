//! Span helpers for background ticket processing.

use tracing::Span;

use crate::model::{TicketId, Trigger};

/// Span wrapping one SLA sweep.
pub fn start_sweep_span() -> Span {
    tracing::info_span!("sla.sweep")
}

/// Span wrapping one automation `process_event` call.
pub fn start_automation_span(ticket: &TicketId, trigger: Trigger) -> Span {
    tracing::info_span!(
        "automation.process",
        "ticket.id" = %ticket.0,
        "automation.trigger" = %trigger,
    )
}

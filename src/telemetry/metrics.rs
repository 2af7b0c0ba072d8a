//! Metric instrument factories for ticketflow.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"ticketflow"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for ticketflow instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("ticketflow")
}

/// Counter: ticket status transitions.
/// Labels: `from`, `to`.
pub fn ticket_transitions() -> Counter<u64> {
    meter()
        .u64_counter("ticketflow.ticket.transitions")
        .with_description("Number of ticket status transitions")
        .build()
}

/// Counter: escalation actions applied to breached tickets.
/// Labels: `action`.
pub fn escalations() -> Counter<u64> {
    meter()
        .u64_counter("ticketflow.sla.escalations")
        .with_description("Number of escalation actions applied")
        .build()
}

/// Counter: tickets found past due by a sweep.
pub fn sla_breaches() -> Counter<u64> {
    meter()
        .u64_counter("ticketflow.sla.breaches")
        .with_description("Breached tickets found by SLA sweeps")
        .build()
}

/// Counter: tickets found inside the warning horizon by a sweep.
pub fn sla_warnings() -> Counter<u64> {
    meter()
        .u64_counter("ticketflow.sla.warnings")
        .with_description("At-risk tickets found by SLA sweeps")
        .build()
}

/// Histogram: SLA sweep duration in milliseconds.
pub fn sweep_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("ticketflow.sla.sweep.duration_ms")
        .with_description("SLA sweep duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: automation rule evaluations.
/// Labels: `trigger`, `result` ("applied" | "not_matched" | "skipped" | "failed").
pub fn automation_rule_runs() -> Counter<u64> {
    meter()
        .u64_counter("ticketflow.automation.rule_runs")
        .with_description("Number of automation rule evaluations")
        .build()
}

/// Counter: outbound webhook and notification deliveries.
/// Labels: `kind`, `result` ("ok" | "rejected" | "error").
pub fn dispatches() -> Counter<u64> {
    meter()
        .u64_counter("ticketflow.dispatch.deliveries")
        .with_description("Outbound webhook and notification deliveries")
        .build()
}

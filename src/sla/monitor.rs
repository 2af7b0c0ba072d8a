//! Periodic SLA sweep: escalate breached tickets, log at-risk ones.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{Instrument, debug, error, info, warn};

use super::escalation::EscalationExecutor;
use crate::error::Result;
use crate::model::Ticket;
use crate::store::TicketStore;
use crate::telemetry::{metrics, ticket::start_sweep_span};

/// Configuration for the SLA monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// How far ahead of `due_at` a ticket counts as at risk.
    pub warning_horizon: chrono::Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            warning_horizon: chrono::Duration::minutes(30),
        }
    }
}

/// Counts from one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub breached: usize,
    pub escalated: usize,
    /// Breached, but the policy had nothing to apply.
    pub unchanged: usize,
    pub failed: usize,
    pub warnings: usize,
}

pub struct SlaMonitor {
    store: Arc<dyn TicketStore>,
    executor: Arc<EscalationExecutor>,
    config: MonitorConfig,
    shutdown: Arc<Notify>,
}

impl Clone for SlaMonitor {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            executor: Arc::clone(&self.executor),
            config: self.config.clone(),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl SlaMonitor {
    pub fn new(
        store: Arc<dyn TicketStore>,
        executor: Arc<EscalationExecutor>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            executor,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the monitor loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Tickets past `due_at` that are neither completed nor closed.
    pub async fn check_violations(&self, now: DateTime<Utc>) -> Result<Vec<Ticket>> {
        Ok(self
            .store
            .tickets_due_by(now)
            .await?
            .into_iter()
            .filter(|t| t.due_at.is_some_and(|due| due < now) && !t.status.is_resolved())
            .collect())
    }

    /// Open tickets due within `(now, now + horizon]`.
    pub async fn check_warnings(&self, now: DateTime<Utc>) -> Result<Vec<Ticket>> {
        let horizon = now + self.config.warning_horizon;
        Ok(self
            .store
            .tickets_due_by(horizon)
            .await?
            .into_iter()
            .filter(|t| {
                t.due_at.is_some_and(|due| due > now && due <= horizon)
                    && !t.status.is_resolved()
                    && !t.status.is_terminal()
            })
            .collect())
    }

    /// One pass: escalate every breach, log every warning.
    ///
    /// A failure on one ticket is logged and counted; the rest of the
    /// sweep carries on. Warnings never mutate anything.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let started = Instant::now();
        let mut report = SweepReport::default();

        let breaches = self.check_violations(now).await?;
        report.breached = breaches.len();

        for ticket in &breaches {
            let Some(due) = ticket.due_at else { continue };
            let reason = format!("SLA breached by {} minutes", (now - due).num_minutes());

            match self.executor.escalate(ticket.id, &reason, now).await {
                Ok(Some(_)) => report.escalated += 1,
                Ok(None) => report.unchanged += 1,
                Err(e) => {
                    error!(ticket = %ticket.id, tenant = %ticket.tenant_id, "escalation failed: {e}");
                    report.failed += 1;
                }
            }
        }

        let warnings = self.check_warnings(now).await?;
        report.warnings = warnings.len();
        for ticket in &warnings {
            if let Some(due) = ticket.due_at {
                warn!(
                    ticket = %ticket.id,
                    tenant = %ticket.tenant_id,
                    status = %ticket.status,
                    minutes_left = (due - now).num_minutes(),
                    "ticket at risk of breaching SLA"
                );
            }
        }

        metrics::sla_breaches().add(report.breached as u64, &[]);
        metrics::sla_warnings().add(report.warnings as u64, &[]);
        metrics::sweep_duration_ms().record(started.elapsed().as_millis() as f64, &[]);

        Ok(report)
    }

    /// Run sweeps on the configured interval until shutdown.
    pub async fn run(&self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(interval_secs = self.config.interval.as_secs(), "sla monitor started");

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("sla monitor shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let span = start_sweep_span();
            match self.sweep(Utc::now()).instrument(span).await {
                Ok(report) => debug!(?report, "sla sweep finished"),
                Err(e) => error!("sla sweep failed: {e}"),
            }
        }
    }
}

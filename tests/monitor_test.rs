//! SLA sweep: breach and warning selection, escalation, isolation.

mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use common::Harness;
use ticketflow::event::EventKind;
use ticketflow::model::*;
use ticketflow::sla::{MonitorConfig, SlaMonitor};
use ticketflow::store::TicketStore;
use ticketflow::workflow::Lifecycle;

#[tokio::test]
async fn violations_are_open_tickets_past_due() {
    let h = Harness::new();
    let now = Utc::now();
    let breached = h.seed_due(Status::InProgress, now - Duration::minutes(10), None);
    h.seed_due(Status::Closed, now - Duration::minutes(10), None);
    h.seed_due(Status::Completed, now - Duration::minutes(10), None);
    h.seed_due(Status::InProgress, now + Duration::minutes(10), None);
    h.seed(Status::InProgress, Priority::Normal);

    let found = h.monitor().check_violations(now).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, breached.id);
}

#[tokio::test]
async fn warnings_cover_the_horizon_only() {
    let h = Harness::new();
    let now = Utc::now();
    let soon = h.seed_due(Status::Assigned, now + Duration::minutes(20), None);
    let edge = h.seed_due(Status::WaitingForInfo, now + Duration::minutes(30), None);
    h.seed_due(Status::Assigned, now + Duration::minutes(45), None);
    h.seed_due(Status::Rejected, now + Duration::minutes(5), None);
    h.seed_due(Status::Completed, now + Duration::minutes(5), None);
    h.seed_due(Status::InProgress, now - Duration::minutes(5), None);

    let mut found: Vec<TicketId> = h
        .monitor()
        .check_warnings(now)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    found.sort();
    let mut expected = vec![soon.id, edge.id];
    expected.sort();

    assert_eq!(found, expected);
}

#[tokio::test]
async fn sweep_escalates_breaches_and_never_touches_warnings() {
    let h = Harness::new();
    let now = Utc::now();
    let breached = h.seed_due(Status::InProgress, now - Duration::minutes(90), None);
    let at_risk = h.seed_due(Status::InProgress, now + Duration::minutes(10), None);

    let report = h.monitor().sweep(now).await.unwrap();

    assert_eq!(report.breached, 1);
    assert_eq!(report.escalated, 1);
    assert_eq!(report.warnings, 1);
    assert_eq!(report.failed, 0);

    assert_eq!(h.ticket(breached.id).await.priority, Priority::High);
    assert_eq!(h.ticket(at_risk.id).await, at_risk);
    assert!(h.store.ticket_events(at_risk.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn one_failing_ticket_does_not_stop_the_sweep() {
    let h = Harness::new();
    let now = Utc::now();
    let broken = h.seed_due(Status::InProgress, now - Duration::minutes(30), None);
    let healthy = h.seed_due(Status::Assigned, now - Duration::minutes(20), None);
    h.store.fail_writes_for(broken.id);

    let report = h.monitor().sweep(now).await.unwrap();

    assert_eq!(report.breached, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.escalated, 1);
    assert_eq!(h.ticket(broken.id).await, broken);
    assert_eq!(h.ticket(healthy.id).await.priority, Priority::High);
}

#[tokio::test]
async fn disabled_policy_counts_as_unchanged() {
    let h = Harness::new();
    let now = Utc::now();
    let plan = h.plan_with_policy(Some(Parsed::Valid(EscalationPolicy::disabled())));
    h.seed_due(Status::InProgress, now - Duration::minutes(5), Some(plan.id));

    let report = h.monitor().sweep(now).await.unwrap();

    assert_eq!(report.breached, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.escalated, 0);
    assert!(h.store.events().is_empty());
}

#[tokio::test]
async fn critical_ticket_breached_by_one_minute() {
    let h = Harness::new();
    let mut plan = common::plan(h.tenant, "Critical", 15, CalendarMode::TwentyFourSeven);
    plan.resolution_time_minutes = 60;
    h.store.insert_plan(plan.clone());
    let department = DepartmentId::new();
    let manager = UserId::new();
    h.store.set_department_manager(h.tenant, department, manager);

    let lifecycle: Lifecycle = h.lifecycle();
    let ticket = lifecycle
        .create_ticket(
            NewTicket::new(h.tenant, "Payments down")
                .priority(Priority::Critical)
                .department(department),
        )
        .await
        .unwrap();
    assert_eq!(ticket.status, Status::New);
    assert_eq!(ticket.sla_plan, Some(plan.id));
    let due = ticket.due_at.expect("due date from plan");
    assert_eq!(due, ticket.created_at + Duration::minutes(60));

    let report = h
        .monitor()
        .sweep(ticket.created_at + Duration::minutes(61))
        .await
        .unwrap();
    assert_eq!(report.escalated, 1);

    let escalations: Vec<_> = h
        .store
        .ticket_events(ticket.id)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::Escalation {
                actions,
                reason,
                priority,
                assignee,
                ..
            } => Some((actions, reason, priority, assignee)),
            _ => None,
        })
        .collect();
    assert_eq!(escalations.len(), 1);
    let (actions, reason, priority, assignee) = &escalations[0];
    assert_eq!(reason, "SLA breached by 1 minutes");
    assert_eq!(*priority, Priority::Critical);
    assert_eq!(*assignee, Some(manager));
    assert!(actions.iter().any(|a| a == "reassign_to_manager"));
    assert!(!actions.iter().any(|a| a == "increase_priority"));

    let saved = h.ticket(ticket.id).await;
    assert_eq!(saved.status, Status::New);
    assert_eq!(saved.priority, Priority::Critical);
    assert_eq!(saved.assignee, Some(manager));
    assert_eq!(h.dispatcher.notices.lock().len(), 1);
}

#[tokio::test]
async fn run_sweeps_until_shutdown() {
    let h = Harness::new();
    let breached = h.seed_due(Status::InProgress, Utc::now() - Duration::minutes(5), None);
    let monitor = SlaMonitor::new(
        h.store.clone(),
        Arc::new(h.executor()),
        MonitorConfig {
            interval: StdDuration::from_millis(20),
            ..MonitorConfig::default()
        },
    );

    let runner = monitor.clone();
    let task = tokio::spawn(async move { runner.run().await });

    // The first tick fires immediately.
    for _ in 0..100 {
        if h.ticket(breached.id).await.version > breached.version {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    monitor.shutdown();

    tokio::time::timeout(StdDuration::from_secs(5), task)
        .await
        .expect("monitor stopped")
        .unwrap()
        .unwrap();
    // Later ticks may have escalated it again.
    assert!(h.ticket(breached.id).await.priority > Priority::Normal);
}

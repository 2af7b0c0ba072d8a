//! Transition guard: status edges, assignment, comments, creation and
//! priority changes.

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::Harness;
use ticketflow::automation::spawn_worker;
use ticketflow::error::Error;
use ticketflow::event::{EventKind, Visibility};
use ticketflow::model::*;
use ticketflow::store::TicketStore;
use ticketflow::workflow::validate_transition;

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_allowed_edge_is_accepted() {
    let h = Harness::new();
    let lifecycle = h.lifecycle();

    for from in Status::ALL {
        for &to in from.allowed_next() {
            let ticket = h.seed(from, Priority::Normal);
            let event = lifecycle
                .transition(ticket.id, to, None, None)
                .await
                .unwrap_or_else(|e| panic!("{from} -> {to} rejected: {e}"));

            assert_eq!(
                event.kind,
                EventKind::StatusChange { from, to, note: None }
            );
            assert_eq!(event.visibility, Visibility::Public);
            let saved = h.ticket(ticket.id).await;
            assert_eq!(saved.status, to);
            assert_eq!(saved.version, ticket.version + 1);
        }
    }
}

#[tokio::test]
async fn every_other_pair_is_rejected_without_writing() {
    let h = Harness::new();
    let lifecycle = h.lifecycle();

    for from in Status::ALL {
        for to in Status::ALL {
            if from.can_transition_to(to) {
                continue;
            }
            let ticket = h.seed(from, Priority::Normal);
            let err = lifecycle
                .transition(ticket.id, to, None, None)
                .await
                .expect_err("disallowed edge accepted");
            assert!(
                matches!(err, Error::InvalidTransition { .. }),
                "{from} -> {to}: unexpected error {err}"
            );
            assert_eq!(h.ticket(ticket.id).await, ticket);
        }
    }
    assert!(h.store.events().is_empty());
}

#[test]
fn terminal_states_have_no_outgoing_edges() {
    for status in [Status::Rejected, Status::Duplicate, Status::Merged] {
        assert!(status.is_terminal());
        assert!(status.allowed_next().is_empty());
    }
    assert!(validate_transition(Status::New, Status::Assigned).is_ok());
    assert!(validate_transition(Status::New, Status::Completed).is_err());
}

#[tokio::test]
async fn closing_sets_closed_at_and_reopening_clears_it() {
    let h = Harness::new();
    let lifecycle = h.lifecycle();
    let ticket = h.seed(Status::Completed, Priority::Normal);

    lifecycle
        .transition(ticket.id, Status::Closed, None, Some("resolved".into()))
        .await
        .unwrap();
    let closed = h.ticket(ticket.id).await;
    assert_eq!(closed.status, Status::Closed);
    assert!(closed.closed_at.is_some());

    lifecycle
        .transition(ticket.id, Status::InProgress, None, None)
        .await
        .unwrap();
    let reopened = h.ticket(ticket.id).await;
    assert_eq!(reopened.status, Status::InProgress);
    assert_eq!(reopened.closed_at, None);
}

#[tokio::test]
async fn unknown_ticket_is_not_found() {
    let h = Harness::new();
    let err = h
        .lifecycle()
        .transition(TicketId::new(), Status::Assigned, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn stale_version_is_a_conflict() {
    let h = Harness::new();
    let ticket = h.seed(Status::New, Priority::Normal);

    h.lifecycle()
        .transition(ticket.id, Status::Assigned, None, None)
        .await
        .unwrap();

    // `ticket` still carries the version read before the transition.
    let err = h.store.persist(&ticket, &[]).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(h.ticket(ticket.id).await.status, Status::Assigned);
}

// ---------------------------------------------------------------------------
// Assignment and comments
// ---------------------------------------------------------------------------

#[tokio::test]
async fn assigning_a_new_ticket_moves_it_to_assigned() {
    let h = Harness::new();
    let ticket = h.seed(Status::New, Priority::Normal);
    let agent = UserId::new();

    let event = h.lifecycle().assign(ticket.id, agent, None).await.unwrap();

    assert_eq!(
        event.kind,
        EventKind::Assignment {
            from: None,
            to: agent,
            status_change: Some((Status::New, Status::Assigned)),
        }
    );
    let saved = h.ticket(ticket.id).await;
    assert_eq!(saved.status, Status::Assigned);
    assert_eq!(saved.assignee, Some(agent));
}

#[tokio::test]
async fn reassigning_keeps_status() {
    let h = Harness::new();
    let ticket = h.seed(Status::InProgress, Priority::Normal);
    let lifecycle = h.lifecycle();
    let first = UserId::new();
    let second = UserId::new();

    lifecycle.assign(ticket.id, first, None).await.unwrap();
    let event = lifecycle.assign(ticket.id, second, None).await.unwrap();

    assert_eq!(
        event.kind,
        EventKind::Assignment {
            from: Some(first),
            to: second,
            status_change: None,
        }
    );
    assert_eq!(h.ticket(ticket.id).await.status, Status::InProgress);
}

#[tokio::test]
async fn comments_never_change_status() {
    let h = Harness::new();
    let ticket = h.seed(Status::WaitingForInfo, Priority::Normal);
    let lifecycle = h.lifecycle();
    let agent = UserId::new();

    let internal = lifecycle
        .add_comment(ticket.id, "checked the logs", true, Some(agent))
        .await
        .unwrap();
    let public = lifecycle
        .add_comment(ticket.id, "could you send a screenshot?", false, Some(agent))
        .await
        .unwrap();

    assert_eq!(internal.visibility, Visibility::Internal);
    assert!(matches!(internal.kind, EventKind::CommentInternal { .. }));
    assert_eq!(public.visibility, Visibility::Public);
    assert_eq!(public.actor, Some(agent));

    let saved = h.ticket(ticket.id).await;
    assert_eq!(saved.status, Status::WaitingForInfo);
    assert_eq!(saved.last_event_at, public.created_at);
    assert_eq!(h.store.ticket_events(ticket.id).await.unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Creation and priority
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_uses_the_priority_default_plan() {
    let h = Harness::new();
    let critical = h.plan("Critical Response", 60, CalendarMode::TwentyFourSeven);
    h.plan("Standard Support", 480, CalendarMode::TwentyFourSeven);

    let ticket = h
        .lifecycle()
        .create_ticket(NewTicket::new(h.tenant, "VPN down").priority(Priority::Critical))
        .await
        .unwrap();

    assert_eq!(ticket.status, Status::New);
    assert_eq!(ticket.version, 1);
    assert_eq!(ticket.sla_plan, Some(critical.id));
    assert!(!ticket.sla_plan_explicit);
    assert_eq!(ticket.due_at, Some(ticket.created_at + Duration::minutes(60)));

    let events = h.store.ticket_events(ticket.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0].kind, EventKind::Created { .. }));
}

#[tokio::test]
async fn create_without_any_plan_leaves_due_unset() {
    let h = Harness::new();
    let ticket = h
        .lifecycle()
        .create_ticket(NewTicket::new(h.tenant, "Question"))
        .await
        .unwrap();
    assert_eq!(ticket.sla_plan, None);
    assert_eq!(ticket.due_at, None);
}

#[tokio::test]
async fn create_with_unknown_explicit_plan_fails() {
    let h = Harness::new();
    let err = h
        .lifecycle()
        .create_ticket(NewTicket::new(h.tenant, "Question").sla_plan(PlanId::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(h.store.events().is_empty());
}

#[tokio::test]
async fn create_rejects_a_plan_from_another_tenant() {
    let h = Harness::new();
    let foreign = common::plan(TenantId::new(), "Other Support", 30, CalendarMode::TwentyFourSeven);
    h.store.insert_plan(foreign.clone());

    let err = h
        .lifecycle()
        .create_ticket(NewTicket::new(h.tenant, "Question").sla_plan(foreign.id))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(h.store.events().is_empty());
}

#[tokio::test]
async fn priority_change_rederives_a_default_plan() {
    let h = Harness::new();
    h.plan("Standard Support", 480, CalendarMode::TwentyFourSeven);
    let urgent = h.plan("Urgent Support", 120, CalendarMode::TwentyFourSeven);
    let lifecycle = h.lifecycle();

    let ticket = lifecycle
        .create_ticket(NewTicket::new(h.tenant, "Slow laptop"))
        .await
        .unwrap();
    let event = lifecycle
        .change_priority(ticket.id, Priority::Urgent, None)
        .await
        .unwrap();

    let saved = h.ticket(ticket.id).await;
    let expected_due = ticket.created_at + Duration::minutes(120);
    assert_eq!(saved.priority, Priority::Urgent);
    assert_eq!(saved.sla_plan, Some(urgent.id));
    assert_eq!(saved.due_at, Some(expected_due));
    assert_eq!(
        event.kind,
        EventKind::PriorityChange {
            from: Priority::Normal,
            to: Priority::Urgent,
            due_at: Some(expected_due),
        }
    );
}

#[tokio::test]
async fn priority_change_keeps_an_explicit_plan() {
    let h = Harness::new();
    let pinned = h.plan("Contract 4h", 240, CalendarMode::TwentyFourSeven);
    h.plan("Critical Response", 60, CalendarMode::TwentyFourSeven);
    let lifecycle = h.lifecycle();

    let ticket = lifecycle
        .create_ticket(NewTicket::new(h.tenant, "Outage").sla_plan(pinned.id))
        .await
        .unwrap();
    lifecycle
        .change_priority(ticket.id, Priority::Critical, None)
        .await
        .unwrap();

    let saved = h.ticket(ticket.id).await;
    assert_eq!(saved.sla_plan, Some(pinned.id));
    assert!(saved.sla_plan_explicit);
    assert_eq!(saved.due_at, ticket.due_at);
}

#[tokio::test]
async fn email_tickets_raise_created_and_inbound_email() {
    let h = Harness::new();
    let on_created = AutomationRule::from_json(
        h.tenant,
        "tag new",
        Trigger::TicketCreated,
        None,
        &serde_json::json!([{"type": "add_tag", "tag": "triage"}]),
        10,
    );
    let on_email = AutomationRule::from_json(
        h.tenant,
        "tag email",
        Trigger::InboundEmail,
        None,
        &serde_json::json!([{"type": "add_tag", "tag": "email"}]),
        10,
    );
    h.store.insert_rule(on_created);
    h.store.insert_rule(on_email);

    let (queue, worker) = spawn_worker(Arc::new(h.engine()));
    let lifecycle = h.lifecycle().with_automation(queue);
    let ticket = lifecycle
        .create_ticket(NewTicket::new(h.tenant, "Fwd: invoice").source(TicketSource::Email))
        .await
        .unwrap();

    drop(lifecycle);
    worker.await.unwrap();

    let saved = h.ticket(ticket.id).await;
    assert!(saved.tags.contains("triage"));
    assert!(saved.tags.contains("email"));
}

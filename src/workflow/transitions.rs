//! Status adjacency map and the guarded mutations that go with it.
//!
//! Every status change in the crate funnels through
//! [`Ticket::apply_transition`]; nothing assigns `Ticket::status` directly.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{Status, Ticket, UserId};

/// Allowed next states. The match is exhaustive, so adding a status without
/// deciding its edges fails to compile.
pub const fn allowed_next(from: Status) -> &'static [Status] {
    use Status::*;
    match from {
        New => &[Assigned, Rejected],
        Assigned => &[InProgress, New],
        InProgress => &[WaitingForInfo, Completed],
        WaitingForInfo => &[InProgress],
        Completed => &[Closed, InProgress],
        Closed => &[InProgress],
        // Dead ends: no outgoing edges are defined.
        Rejected | Duplicate | Merged => &[],
    }
}

impl Status {
    pub fn allowed_next(self) -> &'static [Status] {
        allowed_next(self)
    }

    pub fn can_transition_to(self, to: Status) -> bool {
        allowed_next(self).contains(&to)
    }
}

/// Reject a disallowed edge.
pub fn validate_transition(from: Status, to: Status) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Outcome of an assignment, for the timeline payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentChange {
    pub from: Option<UserId>,
    pub to: UserId,
    pub status_change: Option<(Status, Status)>,
}

impl Ticket {
    /// Move to `to` if the edge is allowed. Returns the previous status.
    ///
    /// Keeps `closed_at` set exactly while the ticket is `Closed`. On error
    /// the ticket is untouched.
    pub fn apply_transition(&mut self, to: Status, now: DateTime<Utc>) -> Result<Status> {
        validate_transition(self.status, to)?;

        let from = self.status;
        self.status = to;
        self.closed_at = if to == Status::Closed { Some(now) } else { None };
        self.updated_at = now;
        self.last_event_at = now;
        Ok(from)
    }

    /// Set the assignee. A `New` ticket moves straight to `Assigned`; that
    /// implicit move bypasses the edge table.
    pub fn apply_assignment(&mut self, assignee: UserId, now: DateTime<Utc>) -> AssignmentChange {
        let from = self.assignee.replace(assignee);
        let status_change = if self.status == Status::New {
            self.status = Status::Assigned;
            Some((Status::New, Status::Assigned))
        } else {
            None
        };
        self.updated_at = now;
        self.last_event_at = now;
        AssignmentChange {
            from,
            to: assignee,
            status_change,
        }
    }
}

//! Ticket lifecycle: status adjacency map, per-ticket locking and the
//! request-path operations built on them.

pub mod lifecycle;
pub mod locks;
pub mod transitions;

pub use lifecycle::Lifecycle;
pub use locks::{TicketGuard, TicketLocks};
pub use transitions::{AssignmentChange, allowed_next, validate_transition};

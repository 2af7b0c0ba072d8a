//! # ticketflow
//!
//! Workflow and SLA core of a multi-tenant helpdesk.
//!
//! - [`workflow`]: the transition guard. Every status change, assignment,
//!   comment and priority change goes through [`workflow::Lifecycle`].
//! - [`sla`]: due-date arithmetic over a business-hours calendar, the
//!   periodic breach sweep, and policy-driven escalation.
//! - [`automation`]: tenant rules evaluated on lifecycle triggers, fed by a
//!   background queue.
//!
//! Storage and outbound delivery are collaborators behind traits
//! ([`store::TicketStore`], [`store::AuditSink`], [`dispatch::Dispatcher`]);
//! [`db::Db`] backs the store with Postgres.

pub mod automation;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod model;
pub mod sla;
pub mod store;
pub mod telemetry;
pub mod workflow;

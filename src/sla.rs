//! Service-level agreements: due-date clock, breach escalation, and the
//! periodic monitor tying them together.

pub mod clock;
pub mod escalation;
pub mod monitor;

pub use clock::{BusinessCalendar, SlaClock, resolve_default_plan};
pub use escalation::EscalationExecutor;
pub use monitor::{MonitorConfig, SlaMonitor, SweepReport};

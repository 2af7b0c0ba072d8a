//! Declarative automation rules reacting to ticket lifecycle triggers.

pub mod engine;
pub mod queue;

pub use engine::{AutomationEngine, ProcessReport};
pub use queue::{AutomationJob, AutomationQueue, spawn_worker};

//! Core data model.
//!
//! Tickets, SLA plans and automation rules as the engine sees them. The
//! persistence collaborator owns these records; the engine only holds a
//! copy for the duration of one operation.

pub mod ids;
pub mod rule;
pub mod sla;
pub mod ticket;

pub use ids::*;
pub use rule::*;
pub use sla::*;
pub use ticket::*;

use serde::de::DeserializeOwned;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Parsed
// ---------------------------------------------------------------------------

/// A structured JSON field validated once when the record is loaded or saved.
///
/// Malformed input is kept (with the parse error) instead of being rejected,
/// so the consumer decides how to degrade: escalation policies fall back to
/// the conservative default, rule conditions skip the rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    Valid(T),
    Malformed { raw: serde_json::Value, error: String },
}

impl<T: DeserializeOwned> Parsed<T> {
    pub fn from_value(raw: serde_json::Value) -> Self {
        match serde_json::from_value::<T>(raw.clone()) {
            Ok(value) => Parsed::Valid(value),
            Err(e) => Parsed::Malformed {
                raw,
                error: e.to_string(),
            },
        }
    }

    /// Parse from raw text. Text that is not JSON at all is kept as a string.
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(raw) => Self::from_value(raw),
            Err(e) => Parsed::Malformed {
                raw: serde_json::Value::String(text.to_string()),
                error: e.to_string(),
            },
        }
    }
}

impl<T: Serialize> Parsed<T> {
    /// The JSON form written back to storage.
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Parsed::Valid(value) => serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
            Parsed::Malformed { raw, .. } => raw.clone(),
        }
    }
}

impl<T> Parsed<T> {
    pub fn valid(&self) -> Option<&T> {
        match self {
            Parsed::Valid(value) => Some(value),
            Parsed::Malformed { .. } => None,
        }
    }
}

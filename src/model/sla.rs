//! SLA plans and their escalation policies.

use serde::{Deserialize, Serialize};

use super::Parsed;
use super::ids::*;
use crate::error::Error;

/// A named response/resolution budget plus what to do when it is blown.
/// Read-only to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SlaPlan {
    pub id: PlanId,
    pub tenant_id: TenantId,
    pub name: String,
    pub response_time_minutes: i64,
    pub resolution_time_minutes: i64,
    pub calendar: CalendarMode,
    /// `None` when the plan carries no policy at all.
    pub escalation_policy: Option<Parsed<EscalationPolicy>>,
    pub active: bool,
}

impl SlaPlan {
    /// Budget the due date is computed from: resolution time when set,
    /// otherwise response time. `None` when neither is positive.
    pub fn target_minutes(&self) -> Option<i64> {
        if self.resolution_time_minutes > 0 {
            Some(self.resolution_time_minutes)
        } else if self.response_time_minutes > 0 {
            Some(self.response_time_minutes)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarMode {
    /// Mon-Fri inside the configured business window.
    BusinessHours,
    /// Wall-clock time, no calendar.
    TwentyFourSeven,
}

impl std::fmt::Display for CalendarMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CalendarMode::BusinessHours => "business_hours",
            CalendarMode::TwentyFourSeven => "twenty_four_seven",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for CalendarMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "business_hours" | "business" => Ok(CalendarMode::BusinessHours),
            "twenty_four_seven" | "24x7" => Ok(CalendarMode::TwentyFourSeven),
            other => Err(Error::Other(format!("unknown calendar mode: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Escalation policy
// ---------------------------------------------------------------------------

/// Corrective actions applied when a ticket breaches its SLA.
///
/// Flags absent from the stored JSON read as `false`. The [`Default`] is the
/// conservative fallback used when a plan has no usable policy: every
/// action enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    #[serde(default)]
    pub increase_priority: bool,
    #[serde(default)]
    pub reassign_to_manager: bool,
    #[serde(default)]
    pub notify_stakeholders: bool,
    #[serde(default)]
    pub notification_targets: Vec<String>,
    #[serde(default)]
    pub webhook: Option<String>,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            increase_priority: true,
            reassign_to_manager: true,
            notify_stakeholders: true,
            notification_targets: Vec::new(),
            webhook: None,
        }
    }
}

impl EscalationPolicy {
    pub fn disabled() -> Self {
        Self {
            increase_priority: false,
            reassign_to_manager: false,
            notify_stakeholders: false,
            notification_targets: Vec::new(),
            webhook: None,
        }
    }
}

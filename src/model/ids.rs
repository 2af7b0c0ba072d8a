//! Newtype identifiers. All are UUID-backed; `Display` shows the short form.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                // Short display: first 8 chars of UUID
                write!(f, "{}", &self.0.to_string()[..8])
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Ticket identifier.
    TicketId
);
uuid_id!(
    /// Tenant (organisation) identifier. Every ticket, plan and rule is tenant-scoped.
    TenantId
);
uuid_id!(UserId);
uuid_id!(DepartmentId);
uuid_id!(CategoryId);
uuid_id!(
    /// SLA plan identifier.
    PlanId
);
uuid_id!(
    /// Automation rule identifier.
    RuleId
);
uuid_id!(EventId);

//! Per-ticket mutual exclusion.
//!
//! Held for the load-mutate-persist span of one workflow operation so a
//! request-path transition cannot interleave with an escalation or an
//! automation rule on the same ticket inside this process. The version
//! check in `TicketStore::persist` covers writers in other processes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use crate::model::TicketId;

#[derive(Clone, Default)]
pub struct TicketLocks {
    locks: Arc<Mutex<HashMap<TicketId, Arc<tokio::sync::Mutex<()>>>>>,
}

/// Releases the ticket on drop.
pub struct TicketGuard {
    _guard: OwnedMutexGuard<()>,
}

impl TicketLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: TicketId) -> TicketGuard {
        let lock = {
            let mut locks = self.locks.lock();
            // Drop entries nobody is holding or waiting on.
            if locks.len() > 1024 {
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            Arc::clone(locks.entry(id).or_default())
        };
        TicketGuard {
            _guard: lock.lock_owned().await,
        }
    }
}

//! Change notification for cross-client convergence.
//!
//! Every successful write publishes an invalidation signal keyed by entity
//! class; readers re-fetch on receipt. There is no optimistic merge: the
//! last valid atomic write wins.

use serde::Serialize;
use tokio::sync::broadcast;

/// Entity classes a write can invalidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityClass {
    Accounts,
    Entries,
    Documents,
    Periods,
    Audit,
}

/// Broadcast-based invalidation channel.
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<EntityClass>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// Publish an invalidation. A send with no subscribers is not an error.
    pub fn publish(&self, class: EntityClass) {
        let _ = self.tx.send(class);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EntityClass> {
        self.tx.subscribe()
    }
}

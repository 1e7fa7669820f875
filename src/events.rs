//! In-process ledger event bus.
//!
//! The engine publishes `FeedsUpdated`; the host publishes the rest as the
//! node reports them.

use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// At least one oracle feed some curve depends on changed
    FeedsUpdated,
    /// A trade request was applied to `agent`
    RequestApplied { agent: String },
    /// A new agent was defined from `template`
    DefinitionApplied { address: String, template: String },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Deliver to current subscribers; dropped silently when nobody listens.
    pub fn publish(&self, event: LedgerEvent) {
        if self.tx.send(event).is_err() {
            trace!("no subscribers for ledger event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

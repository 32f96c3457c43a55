//! Lifecycle events, broadcast to any number of subscribers

use tokio::sync::broadcast;

/// Capacity of the event channel. Slow subscribers see `Lagged`.
pub const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultEvent {
    /// Wrong verification code, corrupted record or missing storage key
    DecryptionFailed { id: String },
    /// The last hit point was spent
    HitPointLimitReached { id: String },
    Expired { id: String },
    /// Record and fragment deleted
    Destroyed { id: String },
}

impl VaultEvent {
    pub fn id(&self) -> &str {
        match self {
            Self::DecryptionFailed { id }
            | Self::HitPointLimitReached { id }
            | Self::Expired { id }
            | Self::Destroyed { id } => id,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<VaultEvent>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub(crate) fn emit(&self, event: VaultEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.tx.subscribe()
    }
}

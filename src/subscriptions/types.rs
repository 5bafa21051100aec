//! Subscription types for live state updates.

use crate::types::StateDocument;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Callback invoked with the post-mutation document.
pub type Listener = Arc<dyn Fn(&StateDocument) + Send + Sync>;

/// Events emitted on change channels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// A section was updated in place.
    Changed {
        /// Top-level section name (e.g. `agentKnowledge`).
        section: String,
        /// Nested field name, for nested updates.
        field: Option<String>,
        /// Whether the change was written to storage.
        persisted: bool,
    },

    /// The persisted snapshot was loaded and merged.
    Loaded {
        /// Sections that failed validation and were reset.
        quarantined: Vec<String>,
    },

    /// The whole document was replaced (backend reconciliation).
    Replaced,

    /// The document was reset to defaults.
    Reset,

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to a change-event channel.
pub struct EventHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<StateEvent>,
}

impl EventHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<StateEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<StateEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<StateEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<StateEvent> {
        self.receiver.try_iter().collect()
    }
}

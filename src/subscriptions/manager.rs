//! Subscription manager for broadcasting state changes.

use crate::types::StateDocument;
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{DropReason, EventHandle, Listener, StateEvent, SubscriptionId};

/// Manages listeners and event channels.
pub struct SubscriptionManager {
    /// Callback listeners, ordered by id (= subscription order).
    listeners: RwLock<BTreeMap<SubscriptionId, Listener>>,
    /// Event channels by id.
    channels: RwLock<BTreeMap<SubscriptionId, Sender<StateEvent>>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(BTreeMap::new()),
            channels: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a listener. It is not called until the next `notify`.
    pub fn subscribe(&self, listener: Listener) -> SubscriptionId {
        let id = self.next_id();
        self.listeners.write().insert(id, listener);
        id
    }

    /// Open a bounded event channel.
    pub fn open_channel(&self, buffer_size: usize) -> EventHandle {
        let id = self.next_id();
        let (sender, receiver) = bounded(buffer_size.max(1));
        self.channels.write().insert(id, sender);
        EventHandle { id, receiver }
    }

    /// Unsubscribe a listener or close a channel.
    ///
    /// Returns false if the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        if self.listeners.write().remove(&id).is_some() {
            return true;
        }

        match self.channels.write().remove(&id) {
            Some(sender) => {
                // Best effort, the receiver may already be gone
                let _ = sender.try_send(StateEvent::Dropped {
                    reason: DropReason::Unsubscribed,
                });
                true
            }
            None => false,
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Number of open event channels.
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Deliver `doc` to every listener, then `event` to every channel.
    ///
    /// Listeners run on the calling thread in subscription order. The
    /// listener table is not locked while they run, so a listener may
    /// subscribe or unsubscribe.
    pub fn notify(&self, doc: &StateDocument, event: StateEvent) {
        let listeners: Vec<Listener> = self.listeners.read().values().cloned().collect();
        for listener in listeners {
            listener(doc);
        }

        self.broadcast(event);
    }

    /// Send an event to all channels. Drops subscribers that fail to receive.
    fn broadcast(&self, event: StateEvent) {
        let mut to_remove = Vec::new();

        {
            let channels = self.channels.read();
            for (id, sender) in channels.iter() {
                if sender.try_send(event.clone()).is_err() {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut channels = self.channels.write();
            for id in to_remove {
                if let Some(sender) = channels.remove(&id) {
                    tracing::debug!(subscription = id.0, "Dropping slow state subscriber");
                    // Might fail, the buffer is full
                    let _ = sender.try_send(StateEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
